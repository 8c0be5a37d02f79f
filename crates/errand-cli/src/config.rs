//! Configuration vault – reads/writes `~/.errand/config.toml`.

use errand_hal::SimRobotConfig;
use errand_runtime::{ExecutorConfig, LogFormat, SchedulingPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted operator configuration stored in `~/.errand/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the remote planner (without the port).
    #[serde(default = "default_planner_url")]
    pub planner_url: String,

    #[serde(default = "default_planner_port")]
    pub planner_port: u16,

    /// Timeout for planner requests, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Simulated robot tuning and fault injection.
    #[serde(default)]
    pub robot: SimRobotConfig,
}

fn default_planner_url() -> String {
    "http://localhost".to_string()
}
fn default_planner_port() -> u16 {
    5000
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            planner_url: default_planner_url(),
            planner_port: default_planner_port(),
            request_timeout_secs: default_request_timeout(),
            log_format: LogFormat::default(),
            executor: ExecutorConfig::default(),
            robot: SimRobotConfig::default(),
        }
    }
}

impl Config {
    /// `planner_url` with the port applied, unless the URL already names one.
    pub fn planner_endpoint(&self) -> String {
        let base = self.planner_url.trim_end_matches('/');
        let authority = base.split_once("://").map_or(base, |(_, rest)| rest);
        if authority.contains(':') {
            base.to_string()
        } else {
            format!("{base}:{}", self.planner_port)
        }
    }
}

/// Return the path to `~/.errand/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".errand").join("config.toml")
}

/// Load the config from disk with `ERRAND_*` overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `ERRAND_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ERRAND_PLANNER_URL` | `planner_url` |
/// | `ERRAND_STEP_TIMEOUT_SECS` | `executor.step_timeout_ms` |
/// | `ERRAND_POLICY` | `executor.policy` (`append` / `reject`) |
/// | `ERRAND_LOG_FORMAT` | `log_format` (`compact` / `json`) |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ERRAND_PLANNER_URL") {
        cfg.planner_url = v;
    }
    if let Ok(v) = std::env::var("ERRAND_STEP_TIMEOUT_SECS")
        && let Ok(secs) = v.trim().parse::<u64>()
    {
        cfg.executor.step_timeout_ms = secs.saturating_mul(1000);
    }
    if let Ok(v) = std::env::var("ERRAND_POLICY")
        && let Ok(policy) = v.parse::<SchedulingPolicy>()
    {
        cfg.executor.policy = policy;
    }
    if let Ok(v) = std::env::var("ERRAND_LOG_FORMAT")
        && let Ok(format) = v.parse::<LogFormat>()
    {
        cfg.log_format = format;
    }
}

/// Save the config to disk, creating `~/.errand/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_keeps_executor_table() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.executor.pick_timeout_ms = 7_500;
        cfg.executor.policy = SchedulingPolicy::RejectWhileBusy;
        cfg.robot.stall_attach = true;
        save_to(&cfg, &path).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("[executor]"), "{raw}");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.planner_port, 5000);
        assert_eq!(loaded.executor.pick_timeout_ms, 7_500);
        assert!(loaded.robot.stall_attach);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "planner_port = 6000\n\n[executor]\nstep_gap_ms = 50\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.planner_port, 6000);
        assert_eq!(loaded.executor.step_gap_ms, 50);
        assert_eq!(loaded.executor.step_timeout_ms, 15_000);
        assert_eq!(loaded.request_timeout_secs, 30);
    }

    #[test]
    fn config_path_points_to_errand_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".errand"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn planner_endpoint_applies_port_once() {
        let mut cfg = Config::default();
        assert_eq!(cfg.planner_endpoint(), errand_runtime::planner::DEFAULT_PLANNER_URL);
        cfg.planner_url = "http://planner.lan:8000/".into();
        assert_eq!(cfg.planner_endpoint(), "http://planner.lan:8000");
    }

    #[test]
    fn apply_env_overrides_reads_errand_vars() {
        // SAFETY: the only test in this crate touching these variables.
        unsafe {
            std::env::set_var("ERRAND_PLANNER_URL", "http://robot-host");
            std::env::set_var("ERRAND_STEP_TIMEOUT_SECS", "20");
            std::env::set_var("ERRAND_POLICY", "reject");
            std::env::set_var("ERRAND_LOG_FORMAT", "not-a-format");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("ERRAND_PLANNER_URL");
            std::env::remove_var("ERRAND_STEP_TIMEOUT_SECS");
            std::env::remove_var("ERRAND_POLICY");
            std::env::remove_var("ERRAND_LOG_FORMAT");
        }
        assert_eq!(cfg.planner_url, "http://robot-host");
        assert_eq!(cfg.executor.step_timeout_ms, 20_000);
        assert_eq!(cfg.executor.policy, SchedulingPolicy::RejectWhileBusy);
        assert_eq!(cfg.log_format, LogFormat::Compact);
    }
}
