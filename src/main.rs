//! sysmon-probe — console consumer for SystemMonitor telemetry.
//!
//! Thin binary entry point. All logic lives in the `sysmon-ingest` crate;
//! this file parses arguments, sets up logging and prints records as JSON.
//!
//! ## Usage
//! ```bash
//! sysmon-probe once                 # one snapshot, pretty JSON
//! sysmon-probe watch --count 10     # poll, one JSON line per event
//! sysmon-probe inspect              # layout report for the mapped region
//! sysmon-probe diag                 # follow the diagnostics stream
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysmon_ingest::{
    start_diagnostics, start_poller, DiagnosticsEvent, IngestConfig, PipeConnector, PollEvent,
    SnapshotReader,
};

#[derive(Parser)]
#[command(
    name = "sysmon-probe",
    about = "Read SystemMonitor shared-memory snapshots and diagnostics",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (repeat for more: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one snapshot and print it.
    Once,

    /// Poll snapshots on an interval.
    Watch {
        /// Poll interval in milliseconds (defaults to the config value).
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Stop after this many snapshots.
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Report the layout of the mapped region without a full decode.
    Inspect,

    /// Follow the producer's diagnostics stream.
    Diag {
        /// Endpoint name or path (defaults to the config value).
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Stop after this many messages.
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => IngestConfig::default(),
    };

    init_tracing(cli.verbose, &config.log_level);

    match cli.command {
        Commands::Once => once(&config),
        Commands::Watch { interval_ms, count } => watch(&config, interval_ms, count),
        Commands::Inspect => inspect(&config),
        Commands::Diag { endpoint, count } => diag(&config, endpoint, count),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured.parse().unwrap_or(tracing::Level::INFO),
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn once(config: &IngestConfig) -> anyhow::Result<()> {
    let reader = SnapshotReader::from_config(config);
    let Some(snapshot) = reader.read() else {
        anyhow::bail!(
            "no snapshot available: {}",
            reader.last_error().unwrap_or_default()
        );
    };
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn watch(
    config: &IngestConfig,
    interval_ms: Option<u64>,
    count: Option<usize>,
) -> anyhow::Result<()> {
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.poller.interval());
    let reader = Arc::new(SnapshotReader::from_config(config));
    let handle = start_poller(reader, interval, config.poller.channel_capacity);

    let mut seen = 0;
    for event in handle.receiver.iter() {
        match event {
            PollEvent::Snapshot {
                snapshot,
                received_at,
            } => {
                let line = serde_json::json!({
                    "receivedAt": received_at.to_rfc3339(),
                    "snapshot": snapshot,
                });
                println!("{line}");
                seen += 1;
                if count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            PollEvent::Unavailable { reason } => tracing::warn!("snapshot unavailable: {reason}"),
        }
    }
    handle.stop();
    Ok(())
}

fn inspect(config: &IngestConfig) -> anyhow::Result<()> {
    let reader = SnapshotReader::from_config(config);
    let Some(report) = reader.inspect() else {
        anyhow::bail!(
            "shared memory unavailable: {}",
            reader.last_error().unwrap_or_default()
        );
    };
    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn diag(
    config: &IngestConfig,
    endpoint: Option<String>,
    count: Option<usize>,
) -> anyhow::Result<()> {
    let endpoint = endpoint.unwrap_or_else(|| config.diagnostics.endpoint.clone());
    let handle = start_diagnostics(PipeConnector::new(&endpoint), &config.diagnostics);

    let mut seen = 0;
    for event in handle.receiver.iter() {
        match event {
            DiagnosticsEvent::Connected { endpoint } => tracing::info!("connected to {endpoint}"),
            DiagnosticsEvent::Disconnected { reason } => tracing::info!("disconnected: {reason}"),
            DiagnosticsEvent::Snapshot(message) => {
                for m in message.layout_mismatches() {
                    tracing::warn!(
                        "producer layout differs: {} at {} (expected {})",
                        m.field,
                        m.reported,
                        m.expected
                    );
                }
                println!("{}", serde_json::to_string(&message)?);
                seen += 1;
                if count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
        }
    }
    handle.stop();
    Ok(())
}
