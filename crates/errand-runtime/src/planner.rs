//! [`PlanSource`] – where multi-step plans come from.
//!
//! The planner is an external oracle: it receives the operator's
//! natural-language request and answers with an ordered list of textual
//! steps (`move(desk_01)`, `pick(laptop)`, …).  [`HttpPlanner`] talks to a
//! planner service over JSON/HTTP:
//!
//! | Method | Path | Body |
//! |---|---|---|
//! | `POST` | `/plan` | [`PlanRequest`] → [`PlanResponse`] |
//! | `GET` | `/health` | any 2xx means healthy |

use std::time::Duration;

use async_trait::async_trait;
use errand_types::{Action, ErrandError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::parser::parse_line;

pub const DEFAULT_PLANNER_URL: &str = "http://localhost:5000";

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanOptions {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub include_debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub user_input: String,
    pub session_id: String,
    #[serde(default)]
    pub options: PlanOptions,
}

impl PlanRequest {
    /// A request tagged with a fresh session id.
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            options: PlanOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResponse {
    pub success: bool,
    #[serde(default)]
    pub plan_sequence: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl PlanResponse {
    /// Parse every step of the plan.  Steps that do not parse are skipped
    /// with a warning, the same recovery a typed script gets.
    pub fn actions(&self) -> Vec<Action> {
        self.plan_sequence
            .iter()
            .enumerate()
            .filter_map(|(i, step)| match parse_line(step) {
                Ok(action) => action,
                Err(e) => {
                    warn!(step = i + 1, text = %step, error = %e, "skipping plan step");
                    None
                }
            })
            .collect()
    }

    /// The actions, or the planner's own failure reason.
    pub fn into_actions(self) -> Result<Vec<Action>, ErrandError> {
        if !self.success {
            return Err(ErrandError::Channel(
                self.error.unwrap_or_else(|| "planner reported failure".into()),
            ));
        }
        Ok(self.actions())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PlanSource
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse, ErrandError>;

    /// Whether the planner is reachable and ready.
    async fn health(&self) -> Result<bool, ErrandError>;
}

/// Async JSON client for a remote planner.
pub struct HttpPlanner {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPlanner {
    /// # Errors
    ///
    /// [`ErrandError::Channel`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ErrandError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(channel)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn channel(e: reqwest::Error) -> ErrandError {
    ErrandError::Channel(format!("planner: {e}"))
}

#[async_trait]
impl PlanSource for HttpPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse, ErrandError> {
        let url = format!("{}/plan", self.base_url);
        debug!(url = %url, session = %request.session_id, "requesting plan");
        let response: PlanResponse = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(channel)?
            .error_for_status()
            .map_err(channel)?
            .json()
            .await
            .map_err(channel)?;
        debug!(steps = response.plan_sequence.len(), success = response.success, "plan received");
        Ok(response)
    }

    async fn health(&self) -> Result<bool, ErrandError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(channel)?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errand_types::Verb;

    #[test]
    fn request_serialises_in_planner_shape() {
        let req = PlanRequest {
            user_input: "put the laptop on the desk".into(),
            session_id: "s-1".into(),
            options: PlanOptions::default(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["user_input"], "put the laptop on the desk");
        assert_eq!(json["options"]["include_debug"], false);
    }

    #[test]
    fn fresh_requests_get_distinct_sessions() {
        assert_ne!(PlanRequest::new("a").session_id, PlanRequest::new("a").session_id);
    }

    #[test]
    fn response_steps_parse_and_bad_ones_are_skipped() {
        let resp: PlanResponse = serde_json::from_str(
            r#"{"success":true,"plan_sequence":["move(desk_01)","dance(wildly)","switch_on(lamp_02)"]}"#,
        )
        .unwrap();
        assert_eq!(resp.metadata, serde_json::Value::Null);
        let actions = resp.actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], Action::new(Verb::Move, "desk_01"));
        assert_eq!(actions[1].verb, Verb::SwitchOn);
    }

    #[test]
    fn failed_plan_surfaces_planner_error() {
        let resp = PlanResponse {
            success: false,
            plan_sequence: vec![],
            metadata: serde_json::Value::Null,
            error: Some("no idea".into()),
        };
        assert_eq!(resp.into_actions(), Err(ErrandError::Channel("no idea".into())));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let p = HttpPlanner::new("http://planner:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(p.base_url(), "http://planner:5000");
    }
}
