//! `grapnel-cli` – Microspine Anchoring Console
//!
//! This binary is the operator surface for the anchoring controller. It:
//!
//! 1. Loads `~/.grapnel/config.toml` (writing the defaults on first run).
//! 2. Builds and sets up the actuator bank — simulated servos in this tree;
//!    a hardware driver plugs in behind the same `ActuatorHandle` trait.
//! 3. Spawns the scheduler and drops the operator into a command loop
//!    (`engage`, `disengage`, `estop`, `status`, `quit`).
//! 4. Intercepts **Ctrl-C** as an emergency stop: shutdown, teardown
//!    (torque off everywhere), and CSV flush before exit.

mod config;

use colored::Colorize;
use grapnel_hal::sim_bank;
use grapnel_runtime::{AnchorController, Scheduler, StatusSnapshot, TelemetryRecorder};
use grapnel_types::{GripRequest, RequestEnvelope};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch};
use tracing::warn;

const REQUEST_SOURCE: &str = "grapnel-cli";

#[tokio::main]
async fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // Initialise tracing-subscriber using RUST_LOG (defaults to "info").
    // Set GRAPNEL_LOG_FORMAT=json to emit newline-delimited JSON logs.
    // The operator-facing output still uses println! for UX consistency.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("GRAPNEL_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  No config found; wrote defaults to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("  No config found ({}); using defaults.", e.dimmed()),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Actuator bank ─────────────────────────────────────────────────────
    let (mut bank, _sims) = sim_bank(&cfg.gripper);
    print!(
        "  Setting up {} simulated actuators … ",
        bank.len().to_string().bold()
    );
    match bank.setup(&cfg.gripper) {
        Ok(()) => println!("{}", "ready".green()),
        Err(e) => {
            // Setup-time failures are the one fatal class: a session must
            // not start with an actuator in the wrong operating mode.
            println!("{}", "failed".red().bold());
            eprintln!("{}: {}", "Fatal setup error".red().bold(), e);
            std::process::exit(1);
        }
    }

    // ── Session wiring ────────────────────────────────────────────────────
    let controller = AnchorController::new(cfg.gripper.clone());
    let recorder = TelemetryRecorder::new();
    let (request_tx, request_rx) = mpsc::channel::<RequestEnvelope>(16);
    let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(controller, bank, recorder, request_rx, status_tx, shutdown_rx);
    let session = tokio::spawn(scheduler.run());

    println!();
    println!("  Type {} for a list of commands.\n", "help".bold().cyan());

    // ── Operator command loop ─────────────────────────────────────────────
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!(
                    "{}",
                    "⚠  Ctrl-C received – E-STOP: releasing grip and shutting down …"
                        .yellow()
                        .bold()
                );
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_command(line.trim(), &request_tx, &status_rx).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin closed unexpectedly");
                    break;
                }
            },
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────
    let _ = shutdown_tx.send(true);
    match session.await {
        Ok((recorder, summary)) => {
            match recorder.export_to_path(&cfg.export_path) {
                Ok(()) => println!(
                    "  {} {} samples written to {}",
                    "✓".green(),
                    summary.samples.to_string().bold(),
                    cfg.export_path.bold()
                ),
                Err(e) => println!("{}: {}", "Telemetry export failed".red(), e),
            }
            println!(
                "  {} session closed: {} ticks, {} faults recovered, {} release stalls.",
                "✓".green(),
                summary.ticks,
                summary.faults,
                summary.release_stalls
            );
        }
        Err(e) => println!("{}: {}", "Session task failed".red().bold(), e),
    }
}

/// Dispatch one operator command. Returns `false` when the loop should end.
async fn handle_command(
    command: &str,
    request_tx: &mpsc::Sender<RequestEnvelope>,
    status_rx: &watch::Receiver<StatusSnapshot>,
) -> bool {
    match command {
        "" => true,
        "engage" => {
            post(request_tx, GripRequest::Engage).await;
            true
        }
        "disengage" => {
            post(request_tx, GripRequest::Disengage).await;
            true
        }
        "estop" => {
            // The emergency stop routes to the release path: the safest
            // reachable configuration is spines at the home angle.
            println!("{}", "  E-STOP: driving spines home.".red().bold());
            post(request_tx, GripRequest::Disengage).await;
            true
        }
        "status" => {
            let snapshot = status_rx.borrow().clone();
            println!("  State: {}", snapshot.state.bold());
            if snapshot.summary.is_empty() {
                println!("  (no telemetry yet)");
            } else {
                for line in snapshot.summary.lines() {
                    println!("  {line}");
                }
            }
            true
        }
        "help" => {
            println!("  {}     begin engagement (IDLE only)", "engage".bold());
            println!("  {}  release the grip and drive home", "disengage".bold());
            println!("  {}      emergency stop (routes to disengage)", "estop".bold());
            println!("  {}     show the current state and load summary", "status".bold());
            println!("  {}       end the session (teardown + CSV export)", "quit".bold());
            true
        }
        "quit" | "exit" => false,
        other => {
            println!(
                "  Unknown command {:?}; type {} for a list.",
                other,
                "help".bold().cyan()
            );
            true
        }
    }
}

async fn post(request_tx: &mpsc::Sender<RequestEnvelope>, request: GripRequest) {
    let envelope = RequestEnvelope::new(REQUEST_SOURCE, request);
    if request_tx.send(envelope).await.is_err() {
        println!("{}", "  Session has already ended.".dimmed());
    }
}

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║   GRAPNEL · Microspine Anchoring     ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
}
