//! [`Scheduler`] – the FIFO task queue and its single executor loop.
//!
//! `enqueue` on an idle scheduler spawns the loop; `enqueue` on a busy one
//! appends to the live queue and the running loop picks the action up.  At
//! most one loop exists at a time, so actions run strictly in submission
//! order and never overlap.
//!
//! The loop stops on the first failed or timed-out action, dropping whatever
//! is still queued.  Either way the open batch window is flushed and a
//! summary line is shown:
//!
//! ```text
//! Execution COMPLETE (3/3 steps, 7.84s)
//! FAILED at step 2: pick(laptop) (Timed out after 5000 ms waiting for pick)
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use errand_middleware::ReportSink;
use errand_types::{Action, ErrandError, ExecutionOutcome, Severity};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::UpdateAggregator;
use crate::config::{ExecutorConfig, SchedulingPolicy};
use crate::executor::Executor;
use crate::parser::{parse_command, parse_script};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Action>,
    running: bool,
    /// Actions accepted since the loop last went idle.
    accepted: usize,
    /// Actions the current run has dispatched.
    dispatched: usize,
    started: Option<Instant>,
}

struct Shared {
    queue: Mutex<QueueState>,
    executor: tokio::sync::Mutex<Executor>,
    aggregator: UpdateAggregator,
    sink: Arc<dyn ReportSink>,
    config: ExecutorConfig,
    busy: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap to clone; clones drive the same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(executor: Executor, sink: Arc<dyn ReportSink>) -> Self {
        let ctx = executor.context();
        let aggregator = ctx.aggregator.clone();
        let config = ctx.config.clone();
        let (busy, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState::default()),
                executor: tokio::sync::Mutex::new(executor),
                aggregator,
                sink,
                config,
                busy,
            }),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.shared.lock().running
    }

    /// Number of actions waiting behind the one currently executing.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Append one action, starting the loop if it is idle.
    ///
    /// # Errors
    ///
    /// [`ErrandError::SchedulerBusy`] under
    /// [`SchedulingPolicy::RejectWhileBusy`], or [`ErrandError::Channel`]
    /// when called outside a tokio runtime.
    pub fn enqueue(&self, action: Action) -> Result<(), ErrandError> {
        self.submit(vec![action], false).map(|_| ())
    }

    /// Append a whole plan.  With `batch`, an idle scheduler opens a batch
    /// window first so the plan yields one consolidated update report; a plan
    /// appended to a running loop joins whatever window is already open.
    ///
    /// Returns the number of actions accepted.
    pub fn submit(&self, actions: Vec<Action>, batch: bool) -> Result<usize, ErrandError> {
        if actions.is_empty() {
            return Ok(0);
        }
        let mut queue = self.shared.lock();
        if queue.running && self.shared.config.policy == SchedulingPolicy::RejectWhileBusy {
            drop(queue);
            warn!("submission rejected: plan already executing");
            self.shared.sink.show_message(
                &ErrandError::SchedulerBusy.to_string(),
                Severity::Warning,
            );
            return Err(ErrandError::SchedulerBusy);
        }

        let handle = if queue.running {
            None
        } else {
            Some(tokio::runtime::Handle::try_current().map_err(|e| {
                ErrandError::Channel(format!("scheduler needs a tokio runtime: {e}"))
            })?)
        };

        let count = actions.len();
        if batch && !queue.running {
            self.shared.aggregator.begin_batch();
        }
        queue.pending.extend(actions);
        queue.accepted += count;
        debug!(count, queued = queue.pending.len(), "actions accepted");

        if let Some(handle) = handle {
            queue.running = true;
            queue.accepted = count;
            queue.dispatched = 0;
            queue.started = Some(Instant::now());
            self.shared.busy.send_replace(true);
            let shared = Arc::clone(&self.shared);
            handle.spawn(run_loop(shared));
        }
        Ok(count)
    }

    /// Parse and submit operator text.
    ///
    /// Multi-line text is a script: bad lines are skipped and the rest runs
    /// as one batch.  A single line is a command: a parse error is shown on
    /// the sink and returned.
    pub fn submit_text(&self, text: &str) -> Result<usize, ErrandError> {
        let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
        if lines > 1 {
            let actions = parse_script(text);
            if actions.is_empty() {
                self.shared
                    .sink
                    .show_message("No valid actions in script", Severity::Warning);
                return Ok(0);
            }
            return self.submit(actions, true);
        }
        match parse_command(text) {
            Ok(action) => self.submit(vec![action], false),
            Err(e) => {
                self.shared.sink.show_message(&e.to_string(), Severity::Error);
                Err(e)
            }
        }
    }

    /// Resolve once the loop is idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.busy.subscribe();
        // The sender lives in `shared`, which outlives this call.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Snapshot of every outcome produced so far.
    pub async fn outcomes(&self) -> Vec<ExecutionOutcome> {
        self.shared.executor.lock().await.outcomes().to_vec()
    }
}

async fn run_loop(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut queue = shared.lock();
            match queue.pending.pop_front() {
                Some(action) => {
                    queue.dispatched += 1;
                    Some((action, queue.dispatched))
                }
                None => {
                    finish(&shared, &mut queue, None);
                    None
                }
            }
        };
        let Some((action, step)) = next else {
            return;
        };

        let outcome = shared.executor.lock().await.execute(&action).await;

        if !outcome.is_success() {
            let mut queue = shared.lock();
            let dropped = queue.pending.len();
            queue.pending.clear();
            if dropped > 0 {
                warn!(dropped, "remaining actions cancelled");
            }
            finish(&shared, &mut queue, Some((step, &outcome)));
            return;
        }

        let more = !shared.lock().pending.is_empty();
        if more {
            tokio::time::sleep(shared.config.step_gap()).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

/// Close out a run.  Called with the queue lock held so a submission cannot
/// slip between going idle and flushing the window.
fn finish(shared: &Shared, queue: &mut QueueState, failure: Option<(usize, &ExecutionOutcome)>) {
    queue.running = false;
    shared.aggregator.end_batch_and_flush();
    let elapsed = queue.started.take().map(|s| s.elapsed()).unwrap_or_default();
    match failure {
        None => {
            let text = format!(
                "Execution COMPLETE ({}/{} steps, {:.2}s)",
                queue.dispatched,
                queue.accepted,
                elapsed.as_secs_f32()
            );
            info!(steps = queue.dispatched, "plan complete");
            shared.sink.show_message(&text, Severity::Info);
        }
        Some((step, outcome)) => {
            let text = format!("FAILED at step {step}: {} ({})", outcome.action, outcome.detail);
            warn!(step, "plan aborted");
            shared.sink.show_message(&text, Severity::Error);
        }
    }
    shared.busy.send_replace(false);
}
