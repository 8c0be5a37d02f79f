//! Planner discovery.
//!
//! Pings the planner's `/health` endpoint with a short blocking request
//! before the REPL starts, so the operator knows whether `/plan` will work.

use std::time::Duration;

use serde::Deserialize;

/// Optional body of a `/health` response.  Planners that answer with an
/// empty or non-JSON body are still healthy if the status is 2xx.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Probe `{base_url}/health`.
///
/// Returns `Ok(report)` when the planner answers with a success status, or
/// `Err(reason)` when it is offline or unhealthy.
///
/// Must be called outside a tokio runtime.
pub fn probe(base_url: &str, timeout: Duration) -> Result<HealthReport, String> {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
    let response = client
        .get(&url)
        .send()
        .map_err(|e| format!("Planner unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("Planner returned HTTP {}", response.status()));
    }

    let body = response.text().unwrap_or_default();
    Ok(parse_report(&body))
}

fn parse_report(body: &str) -> HealthReport {
    serde_json::from_str(body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_is_read() {
        let r = parse_report(r#"{"status":"ok","model":"planner-small"}"#);
        assert_eq!(r.status.as_deref(), Some("ok"));
        assert_eq!(r.model.as_deref(), Some("planner-small"));
    }

    #[test]
    fn plain_body_still_counts_as_healthy() {
        let r = parse_report("OK");
        assert!(r.status.is_none());
    }

    #[test]
    fn unreachable_planner_is_an_error() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let err = probe("http://127.0.0.1:9", Duration::from_millis(200)).unwrap_err();
        assert!(err.contains("unreachable") || err.contains("HTTP"), "{err}");
    }
}
