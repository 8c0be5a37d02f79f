//! Completion detector.
//!
//! Every action state machine exposes the same three hooks: `start` kicks the
//! action off and returns a handle, `poll` samples it, and `abort` cleans up
//! after a deadline expires.  [`await_completion`] drives `poll` on a
//! [`tokio::time::interval`] until the machine reports a terminal state or
//! the deadline passes.  It never samples faster than one tick and yields to
//! the runtime between samples.

use std::time::Duration;

use errand_types::ErrandError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Result of one `poll`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    Pending,
    /// Finished; the string is a human-readable detail.
    Done(String),
    Failed(ErrandError),
}

pub trait StateMachine {
    /// Per-invocation state carried between polls.
    type Handle: Send;

    /// Name used in logs and timeout errors, e.g. `"pick"`.
    fn name(&self) -> &'static str;

    /// Validate preconditions and issue the controller command.
    ///
    /// # Errors
    ///
    /// Precondition failures are returned here, before any waiting starts.
    fn start(&self, argument: &str) -> Result<Self::Handle, ErrandError>;

    fn poll(&self, handle: &mut Self::Handle) -> StepStatus;

    /// Called once when the deadline expires.  Cancels pending controller
    /// work and restores the robot state the action started from.
    fn abort(&self, handle: &mut Self::Handle);
}

/// Terminal result of [`await_completion`].
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Success(String),
    Failure(ErrandError),
    Timeout(ErrandError),
}

impl Completion {
    pub fn into_result(self) -> Result<String, ErrandError> {
        match self {
            Completion::Success(detail) => Ok(detail),
            Completion::Failure(e) | Completion::Timeout(e) => Err(e),
        }
    }
}

/// Poll `machine` every `tick` until it finishes or `deadline` elapses.
///
/// The first sample is taken immediately, so machines that finish
/// synchronously complete without waiting a tick.
pub async fn await_completion<M: StateMachine>(
    machine: &M,
    handle: &mut M::Handle,
    deadline: Duration,
    tick: Duration,
) -> Completion {
    let started = Instant::now();
    let expires = started + deadline;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match machine.poll(handle) {
            StepStatus::Done(detail) => {
                debug!(machine = machine.name(), elapsed_ms = started.elapsed().as_millis() as u64, "step done");
                return Completion::Success(detail);
            }
            StepStatus::Failed(e) => return Completion::Failure(e),
            StepStatus::Pending => {}
        }
        if Instant::now() >= expires {
            let waited_ms = started.elapsed().as_millis() as u64;
            warn!(machine = machine.name(), waited_ms, "step deadline expired");
            machine.abort(handle);
            return Completion::Timeout(ErrandError::Timeout {
                awaiting: machine.name().to_string(),
                waited_ms,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Finishes after `after` polls; `None` never finishes.
    struct CountingMachine {
        after: Option<usize>,
        polls: AtomicUsize,
        aborted: AtomicBool,
    }

    impl CountingMachine {
        fn new(after: Option<usize>) -> Self {
            Self {
                after,
                polls: AtomicUsize::new(0),
                aborted: AtomicBool::new(false),
            }
        }
    }

    impl StateMachine for CountingMachine {
        type Handle = ();

        fn name(&self) -> &'static str {
            "counting"
        }
        fn start(&self, _argument: &str) -> Result<(), ErrandError> {
            Ok(())
        }
        fn poll(&self, _handle: &mut ()) -> StepStatus {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.after {
                Some(limit) if n >= limit => StepStatus::Done(format!("after {n}")),
                _ => StepStatus::Pending,
            }
        }
        fn abort(&self, _handle: &mut ()) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn synchronous_machine_completes_on_first_poll() {
        let m = CountingMachine::new(Some(1));
        let started = Instant::now();
        let c = await_completion(&m, &mut (), Duration::from_secs(1), Duration::from_millis(20)).await;
        assert_eq!(c, Completion::Success("after 1".into()));
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_once_per_tick() {
        let m = CountingMachine::new(Some(5));
        let started = Instant::now();
        let c = await_completion(&m, &mut (), Duration::from_secs(1), Duration::from_millis(20)).await;
        assert!(matches!(c, Completion::Success(_)));
        assert_eq!(m.polls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_millis(80));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_yields_timeout_and_aborts() {
        let m = CountingMachine::new(None);
        let c = await_completion(&m, &mut (), Duration::from_millis(100), Duration::from_millis(20)).await;
        match c {
            Completion::Timeout(ErrandError::Timeout { awaiting, waited_ms }) => {
                assert_eq!(awaiting, "counting");
                assert!(waited_ms >= 100);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(m.aborted.load(Ordering::SeqCst));
        // 0, 20, ..., 100 ms
        assert_eq!(m.polls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn completion_into_result() {
        assert_eq!(Completion::Success("ok".into()).into_result(), Ok("ok".into()));
        let e = ErrandError::TargetNotFound("x".into());
        assert_eq!(Completion::Failure(e.clone()).into_result(), Err(e));
    }
}
