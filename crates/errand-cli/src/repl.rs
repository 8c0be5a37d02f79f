//! REPL – the operator's interactive shell.
//!
//! Plain lines are single commands (`move desk_01`, `pick(laptop)`).
//! Supported slash-commands:
//!   /help           – show this list
//!   /script         – enter a multi-line script, finished by a lone `.`
//!   /plan <request> – ask the planner for a plan and run it
//!   /status         – robot state and last known world state
//!   /wait           – block until the current plan finishes
//!   /quit | /exit   – exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use errand_hal::{Manipulator, ROBOT_NAME, SimRobot, SimScene};
use errand_middleware::{BusSink, EventBus, FanoutSink, ReportSink};
use errand_runtime::{
    Executor, HttpPlanner, MachineContext, PlanRequest, PlanSource, RobotStateHandle, Scheduler,
    UpdateAggregator, parse_script,
};
use errand_types::{ErrandError, ErrorKind};
use errand_world::{SharedWorld, WorldRegistry};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::Config;
use crate::console::ConsoleSink;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Empty,
    Help,
    Script,
    Plan(String),
    Status,
    Wait,
    Quit,
    Command(String),
    Unknown(String),
}

pub fn classify(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with('/') {
        return Input::Command(line.to_string());
    }
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match head {
        "/help" => Input::Help,
        "/script" => Input::Script,
        "/plan" if !rest.trim().is_empty() => Input::Plan(rest.trim().to_string()),
        "/status" => Input::Status,
        "/wait" => Input::Wait,
        "/quit" | "/exit" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the REPL drives: the demo world, its robot and the scheduler.
pub struct Session {
    scheduler: Scheduler,
    robot: SimRobot,
    world: SharedWorld,
    state: RobotStateHandle,
    aggregator: UpdateAggregator,
    planner: Option<HttpPlanner>,
    runtime: Handle,
}

impl Session {
    /// Build the demo scene and wire it to a scheduler.  Must be called
    /// inside the tokio runtime that `runtime` belongs to.
    pub fn demo(cfg: &Config, runtime: Handle) -> Result<Self, ErrandError> {
        let scene = SimScene::demo()?;
        let bus = EventBus::default();
        let robot = SimRobot::new(
            ROBOT_NAME,
            scene.robot,
            scene.world.clone(),
            bus.clone(),
            cfg.robot.clone(),
        )?;

        let sink: Arc<dyn ReportSink> = Arc::new(
            FanoutSink::new()
                .with(Arc::new(ConsoleSink))
                .with(Arc::new(BusSink::new(bus.clone()))),
        );
        let aggregator = UpdateAggregator::new(sink.clone()).with_bus(bus.clone());
        let ctx = MachineContext::new(
            scene.world.clone(),
            robot.clone(),
            bus,
            aggregator.clone(),
            cfg.executor.clone(),
        );
        let state = ctx.state.clone();
        let scheduler = Scheduler::new(Executor::new(ctx, sink.clone()), sink);

        let planner = HttpPlanner::new(
            cfg.planner_endpoint(),
            Duration::from_secs(cfg.request_timeout_secs),
        )
        .map_err(|e| warn!(error = %e, "planner client unavailable"))
        .ok();

        info!(policy = ?cfg.executor.policy, "session ready");
        Ok(Self {
            scheduler,
            robot,
            world: scene.world,
            state,
            aggregator,
            planner,
            runtime,
        })
    }

    fn submit_line(&self, line: &str) {
        match self.scheduler.submit_text(line) {
            Ok(n) => println!("  {}", format!("queued {n} action(s)").dimmed()),
            // Already reported by the scheduler.
            Err(e) if matches!(e.kind(), ErrorKind::Parse | ErrorKind::SchedulerBusy) => {}
            Err(e) => println!("{}: {}", "Rejected".red(), e),
        }
    }

    fn submit_script(&self, text: &str) {
        let actions = parse_script(text);
        if actions.is_empty() {
            println!("  {}", "No valid actions in script.".yellow());
            return;
        }
        match self.scheduler.submit(actions, true) {
            Ok(n) => println!("  {}", format!("queued {n} action(s)").dimmed()),
            Err(e) if e.kind() == ErrorKind::SchedulerBusy => {}
            Err(e) => println!("{}: {}", "Rejected".red(), e),
        }
    }

    fn request_plan(&self, request: &str) {
        let Some(planner) = &self.planner else {
            println!("{}", "No planner configured.".red());
            return;
        };
        print!("  Asking planner at {} … ", planner.base_url().dimmed());
        io::stdout().flush().ok();
        let response = self.runtime.block_on(planner.plan(&PlanRequest::new(request)));
        let actions = match response.and_then(|r| r.into_actions()) {
            Ok(actions) if actions.is_empty() => {
                println!("{}", "empty plan".yellow());
                return;
            }
            Ok(actions) => actions,
            Err(e) => {
                println!("{}", "failed".red());
                println!("  {}", e.to_string().dimmed());
                return;
            }
        };
        println!("{} ({} step(s))", "ok".green(), actions.len());
        for (i, action) in actions.iter().enumerate() {
            println!("    {}. {}", i + 1, action.to_string().bold());
        }
        match self.scheduler.submit(actions, true) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::SchedulerBusy => {}
            Err(e) => println!("{}: {}", "Rejected".red(), e),
        }
    }

    fn print_status(&self) {
        let held = self.robot.held().map(|id| {
            self.world
                .read()
                .name_of(id)
                .map(str::to_string)
                .unwrap_or_else(|| id.to_string())
        });
        println!("{}", "Status".bold().underline());
        println!("  Robot state : {}", self.state.get().to_string().yellow());
        println!("  Holding     : {}", held.as_deref().unwrap_or("nothing").yellow());
        let queue = if self.scheduler.is_busy() {
            format!("running, {} pending", self.scheduler.pending()).green()
        } else {
            "idle".normal()
        };
        println!("  Scheduler   : {}", queue);
        let summary = self.aggregator.summary();
        if summary.is_empty() {
            println!("  World       : {}", "no updates yet".dimmed());
        } else {
            println!("  World       :");
            for line in summary {
                println!("    {}", line);
            }
        }
    }

    fn wait_idle(&self) {
        if self.scheduler.is_busy() {
            self.runtime.block_on(self.scheduler.wait_idle());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(session: &Session, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "errand>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        match classify(&line) {
            Input::Empty => {}
            Input::Help => cmd_help(),
            Input::Script => {
                if let Some(text) = read_script(&stdin) {
                    session.submit_script(&text);
                }
            }
            Input::Plan(request) => session.request_plan(&request),
            Input::Status => session.print_status(),
            Input::Wait => session.wait_idle(),
            Input::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Input::Command(text) => session.submit_line(&text),
            Input::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

/// Read script lines until a lone `.`.  `None` on EOF before any line.
fn read_script(stdin: &io::Stdin) -> Option<String> {
    println!("  {}", "Enter one action per line; finish with a lone '.'".dimmed());
    let mut lines = Vec::new();
    loop {
        print!("{} ", "   ...".dimmed());
        io::stdout().flush().ok();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) if line.trim() == "." => break,
            Ok(_) => lines.push(line.trim_end().to_string()),
        }
    }
    if lines.is_empty() { None } else { Some(lines.join("\n")) }
}

fn cmd_help() {
    println!();
    println!("{}", "Commands".bold().underline());
    println!("  {}  – e.g. move desk_01, pick(laptop), switchon lamp_02", "<action>".bold().cyan());
    println!("  {}    – enter a multi-line script", "/script".bold().cyan());
    println!("  {} – ask the planner and run its plan", "/plan <text>".bold().cyan());
    println!("  {}    – robot and world state", "/status".bold().cyan());
    println!("  {}      – wait for the current plan", "/wait".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
    println!("  Verbs: move, pick, place, open, switchon, switchoff, switch (toggle)");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_command() {
        assert_eq!(classify("  move desk_01 \n"), Input::Command("move desk_01".into()));
        assert_eq!(classify("pick(laptop)"), Input::Command("pick(laptop)".into()));
    }

    #[test]
    fn slash_commands() {
        assert_eq!(classify("/help"), Input::Help);
        assert_eq!(classify("/script"), Input::Script);
        assert_eq!(classify("/status"), Input::Status);
        assert_eq!(classify("/exit"), Input::Quit);
        assert_eq!(classify(""), Input::Empty);
    }

    #[test]
    fn plan_needs_a_request() {
        assert_eq!(
            classify("/plan put the laptop on the desk"),
            Input::Plan("put the laptop on the desk".into())
        );
        assert_eq!(classify("/plan   "), Input::Unknown("/plan".into()));
    }

    #[test]
    fn unknown_slash_command() {
        assert_eq!(classify("/dance now"), Input::Unknown("/dance now".into()));
    }

    #[test]
    fn demo_session_runs_a_command() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let _enter = rt.enter();
        let cfg = Config::default();
        let session = Session::demo(&cfg, rt.handle().clone()).unwrap();
        session.submit_line("switchon lamp_02");
        session.wait_idle();
        assert_eq!(session.aggregator.switch_state("lamp_02"), Some(true));
        assert!(!session.scheduler.is_busy());
    }
}
