//! `errand-types` – shared vocabulary for the Errand execution engine.
//!
//! Every other crate in the workspace speaks in these types: the parser
//! produces [`Action`]s, the executor produces [`ExecutionOutcome`]s, state
//! machines emit [`UpdateRecord`]s, and the event bus carries [`Event`]s.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────────────────────────────────────

/// The symbolic verbs a plan step may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Move,
    Pick,
    Place,
    Open,
    SwitchOn,
    SwitchOff,
    SwitchToggle,
}

impl Verb {
    /// Resolve a verb token.  Matching ignores ASCII case and underscores, so
    /// `SwitchOn`, `switch_on` and `switchon` are the same verb.  The bare
    /// `switch` token toggles.
    pub fn from_token(token: &str) -> Option<Self> {
        let folded: String = token
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "move" => Some(Verb::Move),
            "pick" => Some(Verb::Pick),
            "place" => Some(Verb::Place),
            "open" => Some(Verb::Open),
            "switchon" => Some(Verb::SwitchOn),
            "switchoff" => Some(Verb::SwitchOff),
            "switch" => Some(Verb::SwitchToggle),
            _ => None,
        }
    }

    /// Canonical wire spelling, as used in planner output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Move => "move",
            Verb::Pick => "pick",
            Verb::Place => "place",
            Verb::Open => "open",
            Verb::SwitchOn => "switchon",
            Verb::SwitchOff => "switchoff",
            Verb::SwitchToggle => "switch",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One symbolic instruction in a plan.  Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub verb: Verb,
    pub argument: String,
}

impl Action {
    pub fn new(verb: Verb, argument: impl Into<String>) -> Self {
        Self {
            verb,
            argument: argument.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.verb, self.argument)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// A behavior a world entity supports, queried rather than type-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Door,
    Switch,
    Surface,
}

// ─────────────────────────────────────────────────────────────────────────────
// Robot state
// ─────────────────────────────────────────────────────────────────────────────

/// The single shared state of the robot.
///
/// `Picking` covers both the attach-pending phase and the post-pick holding
/// state; whether an object is actually held is reported by the manipulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RobotState {
    #[default]
    Idle,
    Moving,
    MovingWhileHolding,
    Picking,
    Placing,
}

impl RobotState {
    /// True for the states in which the robot may own a held object.
    pub fn may_hold(&self) -> bool {
        matches!(
            self,
            RobotState::Picking | RobotState::MovingWhileHolding | RobotState::Placing
        )
    }
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RobotState::Idle => "Idle",
            RobotState::Moving => "Moving",
            RobotState::MovingWhileHolding => "MovingWhileHolding",
            RobotState::Picking => "Picking",
            RobotState::Placing => "Placing",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Failure,
    Timeout,
}

/// Terminal result of executing one [`Action`].  Produced exactly once per
/// action and never retried automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub action: Action,
    pub status: OutcomeStatus,
    pub detail: String,
    /// The error behind a `Failure` or `Timeout`; `None` on success.
    pub error: Option<ErrandError>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionOutcome {
    pub fn success(action: Action, detail: impl Into<String>) -> Self {
        Self {
            action,
            status: OutcomeStatus::Success,
            detail: detail.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a failed outcome.  [`ErrandError::Timeout`] maps to
    /// [`OutcomeStatus::Timeout`], everything else to `Failure`.
    pub fn failed(action: Action, error: ErrandError) -> Self {
        let status = match error {
            ErrandError::Timeout { .. } => OutcomeStatus::Timeout,
            _ => OutcomeStatus::Failure,
        };
        Self {
            action,
            status,
            detail: error.to_string(),
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.status {
            OutcomeStatus::Success => "OK",
            OutcomeStatus::Failure => "FAILED",
            OutcomeStatus::Timeout => "TIMEOUT",
        };
        write!(f, "{tag} {} ({})", self.action, self.detail)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// World updates
// ─────────────────────────────────────────────────────────────────────────────

/// Category of a reportable world mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Move,
    Place,
    Open,
    Switch,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Move => "move",
            UpdateKind::Place => "place",
            UpdateKind::Open => "open",
            UpdateKind::Switch => "switch",
        }
    }
}

/// One state-changing side effect produced by a state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub kind: UpdateKind,
    pub subject: String,
    pub position: Option<[f32; 3]>,
    /// Door open / switch on state.
    pub state: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl UpdateRecord {
    pub fn moved(subject: impl Into<String>, position: [f32; 3]) -> Self {
        Self::new(UpdateKind::Move, subject, Some(position), None)
    }

    pub fn placed(subject: impl Into<String>, position: [f32; 3]) -> Self {
        Self::new(UpdateKind::Place, subject, Some(position), None)
    }

    pub fn opened(subject: impl Into<String>, open: bool) -> Self {
        Self::new(UpdateKind::Open, subject, None, Some(open))
    }

    pub fn switched(subject: impl Into<String>, on: bool) -> Self {
        Self::new(UpdateKind::Switch, subject, None, Some(on))
    }

    fn new(
        kind: UpdateKind,
        subject: impl Into<String>,
        position: Option<[f32; 3]>,
        state: Option<bool>,
    ) -> Self {
        Self {
            kind,
            subject: subject.into(),
            position,
            state,
            timestamp: Utc::now(),
        }
    }

    /// Coalescing key: `(type, subject)`, compared case-insensitively.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.subject.to_lowercase())
    }
}

impl fmt::Display for UpdateRecord {
    /// Renders `type:subject` followed by `pos=(x,y,z)` for move/place and
    /// `state=…` for open/switch.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.subject)?;
        if let Some([x, y, z]) = self.position {
            write!(f, " pos=({x:.2},{y:.2},{z:.2})")?;
        }
        if let Some(state) = self.state {
            let word = match (self.kind, state) {
                (UpdateKind::Open, true) => "OPEN",
                (UpdateKind::Open, false) => "CLOSED",
                (_, true) => "ON",
                (_, false) => "OFF",
            };
            write!(f, " state={word}")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// Severity attached to every operator-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event bus
// ─────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "errand-hal::sim"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Edge event: the manipulator attached `object` to its hand.
    Attached { object: String },
    /// Edge event: `object` was released onto `surface`.
    Placed { object: String, surface: String },
    /// The manipulator gave up a placement because it no longer held `object`.
    PlaceAborted { object: String },
    Outcome(ExecutionOutcome),
    WorldUpdate(UpdateRecord),
    Report { text: String, severity: Severity },
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Fieldless discriminant of [`ErrandError`], handy for matching in reports
/// and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Parse,
    TargetNotFound,
    CapabilityMissing,
    PreconditionViolation,
    Timeout,
    ActuatorRejected,
    SchedulerBusy,
    Channel,
}

/// Global error type spanning parsing, world lookups, actuator refusals and
/// deadline expiry.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrandError {
    #[error("Parse error on '{line}': {reason}")]
    Parse { line: String, reason: String },

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Capability {capability:?} missing on {entity}")]
    CapabilityMissing {
        entity: String,
        capability: Capability,
    },

    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Timed out after {waited_ms} ms waiting for {awaiting}")]
    Timeout { awaiting: String, waited_ms: u64 },

    #[error("Actuator rejected: {0}")]
    ActuatorRejected(String),

    #[error("Scheduler busy: a plan is already executing")]
    SchedulerBusy,

    #[error("Channel error: {0}")]
    Channel(String),
}

impl ErrandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrandError::Parse { .. } => ErrorKind::Parse,
            ErrandError::TargetNotFound(_) => ErrorKind::TargetNotFound,
            ErrandError::CapabilityMissing { .. } => ErrorKind::CapabilityMissing,
            ErrandError::PreconditionViolation(_) => ErrorKind::PreconditionViolation,
            ErrandError::Timeout { .. } => ErrorKind::Timeout,
            ErrandError::ActuatorRejected(_) => ErrorKind::ActuatorRejected,
            ErrandError::SchedulerBusy => ErrorKind::SchedulerBusy,
            ErrandError::Channel(_) => ErrorKind::Channel,
        }
    }
}
