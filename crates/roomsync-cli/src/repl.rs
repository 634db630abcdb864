//! REPL – Read-Eval-Print Loop for the roomsync interactive shell.
//!
//! Supported slash-commands:
//!   /sight <group> <major>:<minor>[@rank] … – report a ranging pass
//!   /lost <group>                          – the group's region was left
//!   /room                                  – resolved room and binding
//!   /status                                – sync state and mapping status
//!   /scan <label>                          – give the simulated engine a map
//!   /save                                  – save the bound room's map now
//!   /mapping [status]                      – show or set mapping status
//!   /settings                              – edit `~/.roomsync/config.toml`
//!   /help                                  – show this list
//!   /quit | /exit                          – gracefully exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use roomsync_middleware::{EventBus, SightingReport, SimTrackingEngine, Topic};
use roomsync_runtime::RoomSession;
use roomsync_types::{BeaconIdentity, EventPayload, ProximityRank, RangedBeacon, SyncState, WorldMappingStatus};
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::config::{self, Config};

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Sight { group: String, beacons: Vec<RangedBeacon> },
    Lost { group: String },
    Room,
    Status,
    Scan { label: String },
    Save,
    Mapping(Option<WorldMappingStatus>),
    Settings,
    Quit,
}

/// Everything a command needs to act on.
pub struct Shell<'a> {
    pub runtime: &'a Runtime,
    pub session: &'a RoomSession,
    pub engine: &'a SimTrackingEngine,
    pub namespace: Uuid,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(shell: &Shell<'_>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "roomsync>".bold().cyan());
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

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line, shell.namespace) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(command) => execute(shell, command),
            Err(msg) => println!("{} {}", "Error:".red(), msg),
        }
    }
}

/// Parse one input line. Beacons in `/sight` belong to `namespace`.
pub fn parse_command(line: &str, namespace: Uuid) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    match head {
        "/help" => Ok(Command::Help),
        "/sight" => {
            let group = words
                .next()
                .ok_or("usage: /sight <group> <major>:<minor>[@rank] …")?
                .to_string();
            let beacons = words
                .map(|token| parse_beacon(token, namespace))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Command::Sight { group, beacons })
        }
        "/lost" => {
            let group = words.next().ok_or("usage: /lost <group>")?.to_string();
            Ok(Command::Lost { group })
        }
        "/room" => Ok(Command::Room),
        "/status" => Ok(Command::Status),
        "/scan" => {
            let label = words.collect::<Vec<_>>().join(" ");
            if label.is_empty() {
                return Err("usage: /scan <label>".to_string());
            }
            Ok(Command::Scan { label })
        }
        "/save" => Ok(Command::Save),
        "/mapping" => {
            let rest = words.collect::<Vec<_>>().join(" ");
            if rest.is_empty() {
                Ok(Command::Mapping(None))
            } else {
                parse_mapping_status(&rest).map(|s| Command::Mapping(Some(s)))
            }
        }
        "/settings" => Ok(Command::Settings),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}'. Type /help for available commands.")),
    }
}

/// `MAJOR:MINOR[@RANK]`; rank defaults to `near`.
fn parse_beacon(token: &str, namespace: Uuid) -> Result<RangedBeacon, String> {
    let (ids, rank) = match token.split_once('@') {
        Some((ids, rank)) => (ids, rank.parse::<ProximityRank>()?),
        None => (token, ProximityRank::Near),
    };
    let (major, minor) = ids
        .split_once(':')
        .ok_or_else(|| format!("beacon '{token}' must look like MAJOR:MINOR[@RANK]"))?;
    let major = major
        .parse::<u16>()
        .map_err(|_| format!("invalid major '{major}' in '{token}'"))?;
    let minor = minor
        .parse::<u16>()
        .map_err(|_| format!("invalid minor '{minor}' in '{token}'"))?;
    Ok(RangedBeacon::new(BeaconIdentity::new(namespace, major, minor), rank))
}

fn parse_mapping_status(raw: &str) -> Result<WorldMappingStatus, String> {
    match raw.to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
        "not available" | "notavailable" => Ok(WorldMappingStatus::NotAvailable),
        "limited" => Ok(WorldMappingStatus::Limited),
        "extending" => Ok(WorldMappingStatus::Extending),
        "mapped" => Ok(WorldMappingStatus::Mapped),
        other => Err(format!(
            "unknown mapping status '{other}' (not-available / limited / extending / mapped)"
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn execute(shell: &Shell<'_>, command: Command) {
    match command {
        Command::Help => cmd_help(),
        Command::Sight { group, beacons } => {
            let count = beacons.len();
            let report = SightingReport::new(group.clone(), beacons);
            match shell.runtime.block_on(shell.session.report_sighting(report)) {
                Ok(()) => println!("  {} {} beacon(s) reported for {}", "✓".green(), count, group.bold()),
                Err(e) => println!("{}: {}", "Report failed".red(), e),
            }
        }
        Command::Lost { group } => match shell.runtime.block_on(shell.session.remove_group(group.clone())) {
            Ok(()) => println!("  {} group {} removed", "✓".green(), group.bold()),
            Err(e) => println!("{}: {}", "Report failed".red(), e),
        },
        Command::Room => cmd_room(shell),
        Command::Status => cmd_status(shell),
        Command::Scan { label } => {
            shell.engine.set_current_map(Some(label.clone().into_bytes()));
            println!("  {} engine map is now {}", "✓".green(), label.bold());
        }
        Command::Save => match shell.runtime.block_on(shell.session.save_now()) {
            Ok(version) => println!("  {} map saved as version {}", "✓".green(), version.to_string().bold()),
            Err(e) => println!("{}: {}", "Save failed".red(), e),
        },
        Command::Mapping(None) => {
            println!("  Mapping status: {}", shell.session.mapping_status().borrow().to_string().yellow());
        }
        Command::Mapping(Some(status)) => {
            shell.engine.set_mapping_status(status);
            println!("  {} mapping status set to {}", "✓".green(), status.to_string().bold());
        }
        Command::Settings => cmd_settings(),
        Command::Quit => {}
    }
}

fn cmd_help() {
    println!();
    println!("{}", "roomsync Commands".bold().underline());
    println!("  {}  – report a ranging pass", "/sight <group> <major>:<minor>[@rank] …".bold().cyan());
    println!("  {}  – the group's region was left", "/lost <group>".bold().cyan());
    println!("  {}  – resolved room and map binding", "/room".bold().cyan());
    println!("  {}  – sync state and mapping status", "/status".bold().cyan());
    println!("  {}  – give the simulated engine a map", "/scan <label>".bold().cyan());
    println!("  {}  – save the bound room's map now", "/save".bold().cyan());
    println!("  {}  – show or set mapping status", "/mapping [status]".bold().cyan());
    println!("  {}  – edit ~/.roomsync/config.toml", "/settings".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_room(shell: &Shell<'_>) {
    let current = shell.session.current_room().borrow().clone();
    match current {
        Some(room) => println!("  Resolved room : {}", room.to_string().bold()),
        None => println!("  Resolved room : {}", "none".dimmed()),
    }
    match shell.runtime.block_on(shell.session.binding()) {
        Some(binding) => println!(
            "  Bound map     : {} @ {}",
            binding.room.name.bold(),
            describe_version(binding.version).yellow()
        ),
        None => println!("  Bound map     : {}", "none".dimmed()),
    }
}

fn cmd_status(shell: &Shell<'_>) {
    let state = shell.session.sync_state().borrow().clone();
    println!("{}", "Session Status".bold().underline());
    println!("  Sync state     : {}", describe_state(&state));
    println!(
        "  Mapping status : {}",
        shell.session.mapping_status().borrow().to_string().yellow()
    );
}

fn cmd_settings() {
    let mut cfg = load_config_or_default();

    println!("{}", "Settings Editor".bold().underline());
    println!("  (press Enter to keep the current value; changes apply on next start)");

    cfg.backend_url = prompt_str(&format!("  Backend URL          [{}]: ", cfg.backend_url), &cfg.backend_url);
    cfg.request_timeout_secs = prompt_u64(
        &format!("  Request timeout (s)  [{}]: ", cfg.request_timeout_secs),
        cfg.request_timeout_secs,
    );
    cfg.lookup_timeout_secs = prompt_u64(
        &format!("  Lookup timeout (s)   [{}]: ", cfg.lookup_timeout_secs),
        cfg.lookup_timeout_secs,
    );
    let offline = prompt_str(
        &format!("  Offline mode         [{}]: ", cfg.offline),
        &cfg.offline.to_string(),
    );
    match config::parse_flag(&offline) {
        Some(flag) => cfg.offline = flag,
        None => println!("  {} '{}' is not yes/no, keeping {}", "Warning:".yellow(), offline, cfg.offline),
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event feed
// ─────────────────────────────────────────────────────────────────────────────

/// Print room changes and alerts as they happen.
pub fn spawn_event_printer(runtime: &Runtime, bus: &EventBus) {
    let mut rooms = bus.subscribe_to(Topic::RoomChanges);
    let mut alerts = bus.subscribe_to(Topic::Alerts);
    runtime.spawn(async move {
        loop {
            let received = tokio::select! {
                r = rooms.recv() => r,
                a = alerts.recv() => a,
            };
            let event = match received {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match event.payload {
                EventPayload::RoomChanged { current: Some(room), .. } => {
                    println!("\n  {} entered {}", "→".cyan(), room.name.bold());
                }
                EventPayload::RoomChanged { current: None, .. } => {
                    println!("\n  {} no room resolved", "→".cyan());
                }
                EventPayload::SaveFailed { room, reason } => {
                    println!("\n  {} saving {} failed: {}", "⚠".yellow(), room.name.bold(), reason);
                }
                EventPayload::FetchFailed { room, reason } => {
                    println!("\n  {} fetching {} failed: {}", "⚠".yellow(), room.name.bold(), reason);
                }
                _ => {}
            }
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn describe_state(state: &SyncState) -> String {
    match state {
        SyncState::Idle => "idle".dimmed().to_string(),
        SyncState::Saving { room } => format!("saving {}", room.name).yellow().to_string(),
        SyncState::Fetching { room } => format!("fetching {}", room.name).yellow().to_string(),
        SyncState::Bound { room, version } => {
            format!("bound to {} @ {}", room.name, describe_version(*version)).green().to_string()
        }
        SyncState::Failed { reason } => format!("failed: {reason}").red().to_string(),
    }
}

fn describe_version(version: Option<Uuid>) -> String {
    version.map_or_else(|| "unsaved".to_string(), |v| v.to_string())
}

fn load_config_or_default() -> Config {
    match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {} – using defaults", "Config error".red(), e);
            Config::default()
        }
    }
}

/// Prompt for a u64 value. Returns `default` when the user presses Enter.
fn prompt_u64(msg: &str, default: u64) -> u64 {
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<u64>() {
        Ok(v) => v,
        Err(_) => {
            println!("  {} '{}' is not a number, keeping {}", "Warning:".yellow(), raw, default);
            default
        }
    }
}

/// Prompt for a string value. Returns `default` when the user presses Enter.
pub fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() { default.to_string() } else { trimmed }
        }
        Err(_) => default.to_string(),
    }
}
