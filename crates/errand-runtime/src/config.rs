//! [`ExecutorConfig`] – timing and geometry knobs for the executor.
//!
//! Durations are stored as integer milliseconds so the struct round-trips
//! cleanly through TOML; use the accessor methods to get [`Duration`]s.

use std::time::Duration;

use errand_world::PlacementConfig;
use serde::{Deserialize, Serialize};

/// What happens when a plan is submitted while another is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Append to the live queue; the running loop picks the actions up.
    #[default]
    Append,
    /// Refuse the submission with `SchedulerBusy`.
    RejectWhileBusy,
}

impl std::str::FromStr for SchedulingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "append" => Ok(Self::Append),
            "reject" | "reject_while_busy" => Ok(Self::RejectWhileBusy),
            other => Err(format!("unknown scheduling policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Deadline for move, open and switch steps.
    pub step_timeout_ms: u64,
    pub pick_timeout_ms: u64,
    pub place_timeout_ms: u64,
    /// Poll interval of the completion detector.
    pub tick_ms: u64,
    /// Pause between consecutive actions.
    pub step_gap_ms: u64,
    /// Settle delay after the base arrives.
    pub move_settle_ms: u64,
    /// Settle delay after a door opens.
    pub door_settle_ms: u64,
    /// Added to the base's stopping distance in the arrival test.
    pub arrive_tolerance: f32,
    /// Direct-proximity fallback radius for arrival.
    pub arrive_threshold: f32,
    /// Distance kept between the robot and the target's bounds.
    pub stand_back: f32,
    /// Compared against the squared speed.
    pub residual_speed: f32,
    pub placement: PlacementConfig,
    pub policy: SchedulingPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 15_000,
            pick_timeout_ms: 5_000,
            place_timeout_ms: 5_000,
            tick_ms: 20,
            step_gap_ms: 200,
            move_settle_ms: 500,
            door_settle_ms: 250,
            arrive_tolerance: 1.0,
            arrive_threshold: 2.5,
            stand_back: 0.6,
            residual_speed: 0.05,
            placement: PlacementConfig::default(),
            policy: SchedulingPolicy::Append,
        }
    }
}

impl ExecutorConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn pick_timeout(&self) -> Duration {
        Duration::from_millis(self.pick_timeout_ms)
    }

    pub fn place_timeout(&self) -> Duration {
        Duration::from_millis(self.place_timeout_ms)
    }

    /// Never zero; a zero tick would spin the detector.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn step_gap(&self) -> Duration {
        Duration::from_millis(self.step_gap_ms)
    }

    pub fn move_settle(&self) -> Duration {
        Duration::from_millis(self.move_settle_ms)
    }

    pub fn door_settle(&self) -> Duration {
        Duration::from_millis(self.door_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExecutorConfig::default();
        assert_eq!(c.step_timeout(), Duration::from_secs(15));
        assert_eq!(c.pick_timeout(), Duration::from_secs(5));
        assert_eq!(c.place_timeout(), Duration::from_secs(5));
        assert_eq!(c.policy, SchedulingPolicy::Append);
        assert!((c.placement.margin - 0.02).abs() < 1e-6);
    }

    #[test]
    fn zero_tick_is_clamped() {
        let c = ExecutorConfig {
            tick_ms: 0,
            ..ExecutorConfig::default()
        };
        assert_eq!(c.tick(), Duration::from_millis(1));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c: ExecutorConfig =
            serde_json::from_str(r#"{"step_timeout_ms": 2000, "policy": "reject_while_busy"}"#)
                .unwrap();
        assert_eq!(c.step_timeout_ms, 2000);
        assert_eq!(c.policy, SchedulingPolicy::RejectWhileBusy);
        assert_eq!(c.tick_ms, 20);
    }

    #[test]
    fn policy_from_str_accepts_short_forms() {
        assert_eq!("append".parse(), Ok(SchedulingPolicy::Append));
        assert_eq!("Reject".parse(), Ok(SchedulingPolicy::RejectWhileBusy));
        assert_eq!("reject-while-busy".parse(), Ok(SchedulingPolicy::RejectWhileBusy));
        assert!("later".parse::<SchedulingPolicy>().is_err());
    }
}
