//! Lifeline terminal session runner.
//!
//! Runs one protocol session and reads simulated input from stdin, one
//! command per line (`next`, `say scene is safe`, `yes`, `call`, ...).
//! Events are written through the log.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  stdin thread ──▶ SessionInbox ──▶ runtime (tick · beat)   │
//! │                                        │                   │
//! │                                 SessionController          │
//! │                                        │                   │
//! │                          LogEventSink ◀┘  MonotonicClock   │
//! └────────────────────────────────────────────────────────────┘
//! ```

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{info, warn};

use lifeline::adapters::log_sink::LogEventSink;
use lifeline::adapters::time::MonotonicClock;
use lifeline::app::{SessionCommand, SessionController};
use lifeline::config::SessionConfig;
use lifeline::protocol::ProtocolDefinition;
use lifeline::protocol::library::ProtocolLibrary;
use lifeline::runtime::{SessionInbox, run_session};

static INBOX: SessionInbox = SessionInbox::new();

#[derive(Parser)]
#[command(version, about = "Guided emergency protocols with voice and timers")]
struct Cli {
    /// Bundled protocol id, or a path to a protocol JSON file
    #[arg(short, long, default_value = "cpr")]
    protocol: String,

    /// Session configuration overrides (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List bundled protocols and exit
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Lifeline v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Protocols ──────────────────────────────────────────
    let mut library = ProtocolLibrary::bundled().context("Bundled protocols failed to load")?;
    if cli.list {
        for id in library.ids() {
            println!("{id}");
        }
        return Ok(());
    }
    let protocol = resolve_protocol(&mut library, &cli.protocol)?;
    for warning in protocol.warnings() {
        warn!("Protocol '{}': {warning}", protocol.id());
    }

    // ── 3. Config ─────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            SessionConfig::from_json_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => SessionConfig::default(),
    };

    // ── 4. Input ──────────────────────────────────────────────
    let _reader = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(read_commands)
        .context("Failed to spawn stdin reader")?;

    // ── 5. Run ────────────────────────────────────────────────
    let mut sink = LogEventSink::new();
    let clock = MonotonicClock::new();
    let controller = run_session(
        SessionController::new(protocol, config),
        &INBOX,
        &mut sink,
        &clock,
    );

    if let Ok(snapshot) = controller.snapshot() {
        info!(
            "Final step '{}' after {}s",
            snapshot.step.id,
            clock.uptime_secs()
        );
    }
    Ok(())
}

/// A bundled id, or a file that gets loaded into the library.
fn resolve_protocol(library: &mut ProtocolLibrary, name: &str) -> Result<Arc<ProtocolDefinition>> {
    let path = Path::new(name);
    if path.is_file() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read protocol {}", path.display()))?;
        let id = library
            .load_json(&text)
            .with_context(|| format!("Invalid protocol {}", path.display()))?;
        return library
            .get(&id)
            .ok_or_else(|| anyhow!("Protocol '{id}' vanished after loading"));
    }
    library.get(name).ok_or_else(|| {
        let known: Vec<&str> = library.ids().collect();
        anyhow!("Unknown protocol '{name}' (bundled: {})", known.join(", "))
    })
}

/// Stdin reader.  EOF shuts the session down.
fn read_commands() {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<SessionCommand>() {
            Ok(cmd) => {
                INBOX.submit(cmd);
            }
            Err(e) => warn!("{e}"),
        }
    }
    INBOX.request_shutdown();
}
