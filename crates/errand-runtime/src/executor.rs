//! [`Executor`] – runs one [`Action`] to a terminal [`ExecutionOutcome`].
//!
//! For every action the executor:
//!
//! 1. builds the matching state machine over its [`MachineContext`],
//! 2. calls `start`, turning precondition errors into a failed outcome,
//! 3. hands the handle to [`await_completion`] with the verb's deadline,
//! 4. checks that the robot state agrees with the manipulator's hand,
//! 5. logs the outcome, appends it to the in-memory log, publishes it on
//!    [`Topic::Outcomes`] and shows it on the report sink.
//!
//! Side effects of the action (world writes, update records) always happen
//! before the outcome is produced.

use std::sync::Arc;
use std::time::Duration;

use errand_middleware::{ReportSink, Topic};
use errand_types::{Action, ErrandError, EventPayload, ExecutionOutcome, OutcomeStatus, Severity, Verb};
use tracing::{error, info, instrument, warn};

use crate::completion::{StateMachine, await_completion};
use crate::machines::{
    DoorMachine, LocomotionMachine, MachineContext, PickMachine, PlaceMachine, SwitchCommand,
    SwitchMachine,
};

const SOURCE: &str = "errand-runtime::executor";

pub struct Executor {
    ctx: MachineContext,
    sink: Arc<dyn ReportSink>,
    log: Vec<ExecutionOutcome>,
}

impl Executor {
    pub fn new(ctx: MachineContext, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            ctx,
            sink,
            log: Vec::new(),
        }
    }

    pub fn context(&self) -> &MachineContext {
        &self.ctx
    }

    /// Every outcome produced so far, oldest first.
    pub fn outcomes(&self) -> &[ExecutionOutcome] {
        &self.log
    }

    /// Execute `action` and return its outcome.  Never retries.
    #[instrument(skip_all, fields(action = %action))]
    pub async fn execute(&mut self, action: &Action) -> ExecutionOutcome {
        let result = self.dispatch(action).await;
        let outcome = match result {
            Ok(detail) => ExecutionOutcome::success(action.clone(), detail),
            Err(e) => ExecutionOutcome::failed(action.clone(), e),
        };
        self.check_hand();

        let severity = match outcome.status {
            OutcomeStatus::Success => {
                info!(detail = %outcome.detail, "action succeeded");
                Severity::Info
            }
            OutcomeStatus::Timeout => {
                warn!(detail = %outcome.detail, "action timed out");
                Severity::Warning
            }
            OutcomeStatus::Failure => {
                warn!(detail = %outcome.detail, "action failed");
                Severity::Error
            }
        };
        self.ctx
            .bus
            .emit(Topic::Outcomes, SOURCE, EventPayload::Outcome(outcome.clone()));
        self.sink.show_message(&outcome.to_string(), severity);
        self.log.push(outcome.clone());
        outcome
    }

    /// A held object exists exactly while the state says one may.
    fn check_hand(&self) {
        let state = self.ctx.state.get();
        let holding = self.ctx.manipulator.is_holding();
        if state.may_hold() != holding {
            error!(state = %state, holding, "robot state disagrees with the manipulator");
        }
    }

    async fn dispatch(&self, action: &Action) -> Result<String, ErrandError> {
        let cfg = &self.ctx.config;
        let arg = action.argument.as_str();
        match action.verb {
            Verb::Move => drive(&LocomotionMachine::new(&self.ctx), arg, cfg.step_timeout(), cfg.tick()).await,
            Verb::Pick => drive(&PickMachine::new(&self.ctx), arg, cfg.pick_timeout(), cfg.tick()).await,
            Verb::Place => drive(&PlaceMachine::new(&self.ctx), arg, cfg.place_timeout(), cfg.tick()).await,
            Verb::Open => drive(&DoorMachine::new(&self.ctx), arg, cfg.step_timeout(), cfg.tick()).await,
            Verb::SwitchOn => self.switch(SwitchCommand::On, arg).await,
            Verb::SwitchOff => self.switch(SwitchCommand::Off, arg).await,
            Verb::SwitchToggle => self.switch(SwitchCommand::Toggle, arg).await,
        }
    }

    async fn switch(&self, command: SwitchCommand, arg: &str) -> Result<String, ErrandError> {
        let cfg = &self.ctx.config;
        drive(&SwitchMachine::new(&self.ctx, command), arg, cfg.step_timeout(), cfg.tick()).await
    }
}

async fn drive<M: StateMachine>(
    machine: &M,
    argument: &str,
    deadline: Duration,
    tick: Duration,
) -> Result<String, ErrandError> {
    let mut handle = machine.start(argument)?;
    await_completion(machine, &mut handle, deadline, tick)
        .await
        .into_result()
}
