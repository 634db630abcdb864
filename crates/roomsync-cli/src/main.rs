//! `roomsync-cli` – interactive room-aware map sync client.
//!
//! This binary:
//!
//! 1. Checks for `~/.roomsync/config.toml`; runs a short **first-run setup**
//!    when the file is absent.
//! 2. Starts a [`RoomSession`] against the backend, or fully in process
//!    when `offline = true`, with a simulated tracking engine.
//! 3. Drops the user into an **interactive REPL** where ranging passes are
//!    typed in and room switches, saves and fetches can be watched.
//! 4. Intercepts **Ctrl-C**, saves the bound room's map and exits.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

use roomsync_middleware::SimTrackingEngine;
use roomsync_runtime::{InMemoryMapStore, RoomSession};
use roomsync_types::{RoomSyncError, SyncState};

fn main() {
    let _telemetry = roomsync_runtime::init_tracing("roomsync");

    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – finishing up …".yellow().bold());
        println!("{}", "  Press Enter to save and exit.".dimmed());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => run_first_run_setup(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Session ───────────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    let engine = Arc::new(SimTrackingEngine::new());
    let session = {
        let _enter = runtime.enter();
        match start_session(&cfg, engine.clone()) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("{}: {}", "Failed to start session".red(), e);
                std::process::exit(1);
            }
        }
    };

    if cfg.offline {
        println!(
            "  Mode: {} ({} beacon binding(s))",
            "offline".yellow(),
            cfg.beacons.len()
        );
    } else {
        println!("  Backend: {}", cfg.backend_url.bold());
    }
    println!("  Beacon namespace: {}", cfg.beacon_namespace.to_string().dimmed());
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::spawn_event_printer(&runtime, session.bus());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let shell = repl::Shell {
        runtime: &runtime,
        session: &session,
        engine: &engine,
        namespace: cfg.beacon_namespace,
    };
    repl::run(&shell, shutdown);

    // ── Shutdown ──────────────────────────────────────────────────────────
    let bound = matches!(*session.sync_state().borrow(), SyncState::Bound { .. });
    if bound {
        print!("  Saving map before exit … ");
        match runtime.block_on(session.save_now()) {
            Ok(version) => println!("{} ({})", "OK".green(), version.to_string().dimmed()),
            Err(RoomSyncError::NoMapAvailable) => println!("{}", "nothing to save".dimmed()),
            Err(e) => println!("{}: {}", "FAILED".red(), e),
        }
    }
    drop(session);
    runtime.shutdown_timeout(Duration::from_secs(1));
    println!("{}", "  ✓ Exiting roomsync.".green());
}

fn start_session(cfg: &config::Config, engine: Arc<SimTrackingEngine>) -> Result<RoomSession, RoomSyncError> {
    let session_config = cfg.session_config();
    if cfg.offline {
        Ok(RoomSession::start(
            &session_config,
            Arc::new(cfg.static_lookup()),
            Arc::new(InMemoryMapStore::new()),
            engine,
        ))
    } else {
        RoomSession::connect(&session_config, engine)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-run setup
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_setup() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        roomsync First-Run Setup      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up roomsync.\n");

    let mut cfg = config::Config::default();

    cfg.backend_url = repl::prompt_str(&format!("  Backend URL [{}]: ", cfg.backend_url), &cfg.backend_url);

    let offline = repl::prompt_str("  Run offline (no backend)? [no]: ", "no");
    cfg.offline = config::parse_flag(&offline).unwrap_or(false);

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                  ____              "#.bold().cyan());
    println!("{}", r#"  / _ \___  ___  __ _  / __/_ _____  ____ "#.bold().cyan());
    println!("{}", r#" / , _/ _ \/ _ \/  ' \_\ \/ // / _ \/ __/ "#.bold().cyan());
    println!("{}", r#"/_/|_|\___/\___/_/_/_/___/\_, /_//_/\__/  "#.bold().cyan());
    println!("{}", r#"                         /___/            "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "roomsync".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Room-aware spatial map sync");
    println!();
}
