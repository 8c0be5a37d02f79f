//! [`RobotStateHandle`] – the single shared [`RobotState`] cell.
//!
//! Backed by a [`tokio::sync::watch`] channel so observers (the CLI status
//! line, tests) can await changes without polling.

use errand_types::{ErrandError, RobotState};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RobotStateHandle {
    tx: watch::Sender<RobotState>,
}

impl Default for RobotStateHandle {
    fn default() -> Self {
        Self::new(RobotState::Idle)
    }
}

impl RobotStateHandle {
    pub fn new(initial: RobotState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> RobotState {
        *self.tx.borrow()
    }

    pub fn set(&self, next: RobotState) {
        let prev = self.tx.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "robot state");
        }
    }

    /// Move from `from` to `to`, refusing when the current state differs.
    ///
    /// # Errors
    ///
    /// Returns [`ErrandError::ActuatorRejected`] naming the actual state.
    pub fn transition(&self, from: RobotState, to: RobotState) -> Result<(), ErrandError> {
        let mut actual = from;
        let changed = self.tx.send_if_modified(|state| {
            actual = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if actual != from {
            return Err(ErrandError::ActuatorRejected(format!(
                "robot is {actual}, expected {from}"
            )));
        }
        if changed {
            debug!(from = %from, to = %to, "robot state");
        }
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<RobotState> {
        self.tx.subscribe()
    }
}
