//! `errand-runtime` – the task execution engine.
//!
//! Turns operator text or a planner's step list into a strictly ordered,
//! fail-fast execution against the robot's controllers.
//!
//! # Modules
//!
//! - [`parser`] – [`parse_script`] / [`parse_command`]: textual actions in
//!   `verb(argument)` or `verb argument` form.
//! - [`scheduler`] – [`Scheduler`]: FIFO queue with a single executor loop,
//!   batch windows and plan summaries.
//! - [`executor`] – [`Executor`]: runs one action through its state machine
//!   and records the [`ExecutionOutcome`][errand_types::ExecutionOutcome].
//! - [`machines`] – the per-verb state machines (move, pick, place, open,
//!   switch) over a shared [`MachineContext`].
//! - [`completion`] – [`await_completion`][completion::await_completion]:
//!   polls a machine until it finishes or its deadline expires.
//! - [`aggregator`] – [`UpdateAggregator`]: coalesces world-update records
//!   into one report per plan.
//! - [`robot_state`] – [`RobotStateHandle`]: the watched manipulation state.
//! - [`planner`] – [`PlanSource`] and its HTTP client.
//! - [`config`] – [`ExecutorConfig`] and [`SchedulingPolicy`].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod aggregator;
pub mod completion;
pub mod config;
pub mod executor;
pub mod machines;
pub mod parser;
pub mod planner;
pub mod robot_state;
pub mod scheduler;
pub mod telemetry;

pub use aggregator::UpdateAggregator;
pub use completion::{Completion, StateMachine, StepStatus};
pub use config::{ExecutorConfig, SchedulingPolicy};
pub use executor::Executor;
pub use machines::MachineContext;
pub use parser::{parse_command, parse_line, parse_script};
pub use planner::{HttpPlanner, PlanOptions, PlanRequest, PlanResponse, PlanSource};
pub use robot_state::RobotStateHandle;
pub use scheduler::Scheduler;
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing, init_tracing_with};
