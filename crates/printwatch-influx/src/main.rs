// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! printwatch CLI
//!
//! Runs the InfluxDB telemetry pipeline outside the printer host, reading
//! printer state from a JSON snapshot file.
//!
//! # Usage
//!
//! ```bash
//! # Write a settings file to edit
//! printwatch gen-config --output printwatch.yaml
//!
//! # Check that the server is reachable and the database exists
//! printwatch check --settings printwatch.yaml
//!
//! # Sample until Ctrl+C
//! printwatch run --settings printwatch.yaml --printer printer.json
//!
//! # Record a single event
//! printwatch event --settings printwatch.yaml --printer printer.json PrintDone \
//!     --payload '{"name": "cube.gcode"}'
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use printwatch_influx::{
    ConnectionManager, ConnectionParameters, EventHooks, HttpConnector, InfluxPlugin,
    LifecycleHooks, SettingsStore, SnapshotPrinter, SystemClock, YamlSettings,
};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "printwatch")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stream 3D-printer telemetry to InfluxDB")]
#[command(long_about = None)]
struct Cli {
    /// Verbose mode (debug logs)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample the printer until Ctrl+C
    Run {
        /// Settings file (YAML)
        #[arg(short, long)]
        settings: PathBuf,

        /// Printer snapshot file (JSON), re-read on every sample
        #[arg(short, long)]
        printer: PathBuf,
    },

    /// Connect once and report the outcome
    Check {
        /// Settings file (YAML)
        #[arg(short, long)]
        settings: PathBuf,
    },

    /// Record a single event
    Event {
        /// Settings file (YAML)
        #[arg(short, long)]
        settings: PathBuf,

        /// Printer snapshot file (JSON)
        #[arg(short, long)]
        printer: PathBuf,

        /// Event name, e.g. PrintStarted
        name: String,

        /// Event payload (JSON object)
        #[arg(long)]
        payload: Option<String>,
    },

    /// Write the default settings file
    GenConfig {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "printwatch=debug,printwatch_influx=debug"
    } else {
        "printwatch=info,printwatch_influx=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Command::Run { settings, printer } => run(&settings, printer),
        Command::Check { settings } => check(&settings),
        Command::Event {
            settings,
            printer,
            name,
            payload,
        } => event(&settings, printer, &name, payload.as_deref()),
        Command::GenConfig { output } => gen_config(output.as_deref()),
    }
}

fn load_settings(path: &Path) -> Result<Arc<YamlSettings>> {
    let settings = YamlSettings::load(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    Ok(Arc::new(settings))
}

fn run(settings_path: &Path, printer: PathBuf) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let plugin = InfluxPlugin::new(settings, Arc::new(SnapshotPrinter::new(printer)));

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    ctrlc_handler(stop_tx)?;

    tracing::info!(settings = %settings_path.display(), "Starting printwatch");
    plugin.on_after_startup();

    // Any message or a dropped sender means stop.
    let _ = stop_rx.recv();

    plugin.on_shutdown();
    tracing::info!("printwatch shutdown complete");
    Ok(())
}

fn check(settings_path: &Path) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let params = ConnectionParameters::from_settings(settings.as_ref());
    let manager = ConnectionManager::new(
        settings as Arc<dyn SettingsStore>,
        Box::new(HttpConnector),
        Arc::new(SystemClock),
    );

    manager
        .connect(&params)
        .with_context(|| format!("Connection check failed ({})", params))?;
    println!("OK: connected, database '{}' ready ({})", params.database, params);
    Ok(())
}

fn event(settings_path: &Path, printer: PathBuf, name: &str, payload: Option<&str>) -> Result<()> {
    let payload = match payload {
        Some(raw) => match serde_json::from_str(raw).context("Invalid --payload")? {
            serde_json::Value::Object(map) => map,
            _ => bail!("--payload must be a JSON object"),
        },
        None => serde_json::Map::new(),
    };

    let settings = load_settings(settings_path)?;
    let plugin = InfluxPlugin::new(settings, Arc::new(SnapshotPrinter::new(printer)));

    if !plugin.connection().ensure_connected() {
        bail!("Could not connect to InfluxDB, see log for details");
    }
    plugin.on_event(name, &payload);
    plugin.on_shutdown();
    Ok(())
}

fn gen_config(output: Option<&Path>) -> Result<()> {
    let yaml = YamlSettings::default_yaml().context("Failed to render default settings")?;
    match output {
        Some(path) => {
            std::fs::write(path, yaml)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Default settings written");
        }
        None => print!("{}", yaml),
    }
    Ok(())
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop_tx: mpsc::Sender<()>) -> Result<()> {
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        let _ = stop_tx.send(());
    })
    .context("Failed to install Ctrl+C handler")
}
