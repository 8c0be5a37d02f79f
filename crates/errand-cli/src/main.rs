//! `errand-cli` – operator console for the errand task engine.
//!
//! This binary:
//!
//! 1. Loads `~/.errand/config.toml`, writing the defaults on first run.
//! 2. Probes the remote planner's `/health` endpoint.
//! 3. Builds the demo lab (desk, table, laptop, door, lamp) and a simulated
//!    robot, and wires them to the scheduler.
//! 4. Drops the operator into an **interactive REPL** for single commands,
//!    multi-line scripts and planner requests.
//! 5. Intercepts **Ctrl-C** and exits after the current line.

mod config;
mod console;
mod health;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, warn};

use errand_runtime::init_tracing_with;

/// Short timeout for the startup health probe; a slow planner should not
/// hold up the console.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

fn main() {
    let (cfg, first_run) = match config::load() {
        Ok(Some(cfg)) => (cfg, false),
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            (cfg, true)
        }
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            eprintln!("  Using default configuration.");
            (config::Config::default(), false)
        }
    };

    // Tracing comes up before the tokio runtime; the OTLP exporter is
    // synchronous for that reason.
    let _guard = init_tracing_with("errand", cfg.log_format);

    print_banner();

    if first_run {
        match config::save(&cfg) {
            Ok(()) => println!(
                "  {} Default config written to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
    } else {
        println!(
            "  Config loaded from {}",
            config::config_path().display().to_string().bold()
        );
    }

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – exiting after the current line …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    // ── Planner discovery ─────────────────────────────────────────────────
    // Blocking reqwest must run before the tokio runtime exists.
    let endpoint = cfg.planner_endpoint();
    print!("\n  Probing planner at {} … ", endpoint.dimmed());
    match health::probe(&endpoint, PROBE_TIMEOUT) {
        Ok(report) => {
            let model = report.model.map(|m| format!(" (model {m})")).unwrap_or_default();
            println!("{}{}", "online".green(), model);
        }
        Err(e) => {
            println!("{}", "offline".yellow());
            println!("  {}", e.dimmed());
            println!("  {}", "Single commands and scripts still work; /plan will not.".dimmed());
        }
    }

    // ── Runtime and session ───────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            std::process::exit(1);
        }
    };
    let _enter = runtime.enter();
    let session = match repl::Session::demo(&cfg, runtime.handle().clone()) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "failed to build the demo scene");
            std::process::exit(1);
        }
    };

    println!();
    println!(
        "  Demo lab ready: {}. Type {} for a list of commands.\n",
        "desk_01, table_02, laptop, door_03, lamp_02".bold(),
        "/help".bold().cyan()
    );

    repl::run(&session, shutdown);
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___  _________ ____  ___/ /"#.bold().cyan());
    println!("{}", r#"  / -_)/ __/ __/ _ `/ _ \/ _  / "#.bold().cyan());
    println!("{}", r#"  \__//_/ /_/  \_,_/_//_/\_,_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "errand".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Task execution console for a simulated mobile manipulator");
    println!();
}
