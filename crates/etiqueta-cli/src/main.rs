// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Etiqueta — command-line front end.
//
// Entry point. Initialises logging, loads the engine config from the data
// directory and runs one subcommand against the platform bridge.

mod data_dir;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use etiqueta_core::error::{ErrorKind, EtiquetaError, Result};
use etiqueta_core::human_errors::humanize_error;
use etiqueta_core::types::{BondState, DeviceRecord, Dialect, PrintJob, PrinterEvent, is_valid_address};
use etiqueta_core::EngineConfig;
use etiqueta_print::encoder;
use etiqueta_print::{Engine, EventStream};

/// Etiqueta - Bluetooth label and receipt printer utility
#[derive(Parser, Debug)]
#[command(name = "etiqueta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to <data dir>/etiqueta/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List printers already paired with this machine
    Paired,

    /// Scan for nearby printers
    Scan {
        /// Give up after this many seconds
        #[arg(long, default_value = "12")]
        seconds: u64,
    },

    /// Connect to a printer and print one label
    Print {
        /// Printer address, e.g. 00:11:22:33:44:55
        #[arg(long)]
        address: String,

        /// Label text; newlines start new lines
        #[arg(long)]
        text: String,

        /// Optional CODE128 barcode payload
        #[arg(long)]
        barcode: Option<String>,

        /// Command language (escpos or tspl); overrides the config
        #[arg(long)]
        dialect: Option<Dialect>,
    },

    /// Encode a label and print the bytes as hex, without a printer
    Encode {
        #[arg(long)]
        text: String,

        #[arg(long)]
        barcode: Option<String>,

        #[arg(long)]
        dialect: Option<Dialect>,
    },

    /// Show the effective config, or write it out
    Config {
        /// Write the effective config to the config path
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        let human = humanize_error(&e);
        eprintln!("Error: {}", human.message);
        eprintln!("  {}", human.suggestion);
        tracing::debug!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(data_dir::config_path);
    let config = load_config(&config_path)?;

    match cli.command {
        Commands::Paired => cmd_paired(config),
        Commands::Scan { seconds } => cmd_scan(config, Duration::from_secs(seconds)).await,
        Commands::Print {
            address,
            text,
            barcode,
            dialect,
        } => {
            let mut config = config;
            if let Some(dialect) = dialect {
                config.dialect = dialect;
            }
            cmd_print(config, &address, build_job(text, barcode)).await
        }
        Commands::Encode {
            text,
            barcode,
            dialect,
        } => {
            let dialect = dialect.unwrap_or(config.dialect);
            let command = encoder::encode(&build_job(text, barcode), dialect, &config.label)?;
            println!("{}", hex_dump(command.bytes()));
            Ok(())
        }
        Commands::Config { write } => {
            if write {
                config.save(&config_path)?;
                println!("wrote {}", config_path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Load the config file, or defaults when it does not exist yet.
fn load_config(path: &std::path::Path) -> Result<EngineConfig> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "loading config");
        EngineConfig::load(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        Ok(EngineConfig::default())
    }
}

fn build_job(text: String, barcode: Option<String>) -> PrintJob {
    let job = PrintJob::new(text);
    match barcode {
        Some(barcode) => job.with_barcode(barcode),
        None => job,
    }
}

fn cmd_paired(config: EngineConfig) -> Result<()> {
    let (engine, _events) = Engine::new(etiqueta_bridge::platform_bridge(), config)?;
    let devices = engine.paired_devices()?;

    if devices.is_empty() {
        println!("No paired printers.");
    }
    for device in devices {
        println!("{}  {}", device.address, device.label());
    }
    Ok(())
}

async fn cmd_scan(config: EngineConfig, limit: Duration) -> Result<()> {
    let (engine, mut events) = Engine::new(etiqueta_bridge::platform_bridge(), config)?;
    engine.start_discovery()?;

    let scan = async {
        while let Some(event) = events.recv().await {
            match event {
                PrinterEvent::DeviceDiscovered(device) => {
                    println!("{}  {}", device.address, device.label());
                }
                PrinterEvent::Error {
                    kind: ErrorKind::DiscoveryFinished,
                    ..
                } => break,
                other => log_event(&other),
            }
        }
    };
    if tokio::time::timeout(limit, scan).await.is_err() {
        tracing::info!(seconds = limit.as_secs(), "scan time limit reached");
    }

    engine.shutdown().await;
    Ok(())
}

async fn cmd_print(config: EngineConfig, address: &str, job: PrintJob) -> Result<()> {
    if !is_valid_address(address) {
        return Err(EtiquetaError::Config(format!(
            "'{address}' is not a Bluetooth address"
        )));
    }

    let (engine, events) = Engine::new(etiqueta_bridge::platform_bridge(), config)?;
    let logger = tokio::spawn(log_events(events));

    let device = engine
        .find_paired_device(address)
        .unwrap_or_else(|| DeviceRecord::new(address, "", BondState::Unbonded));
    tracing::info!(address = %device.address, name = %device.label(), "connecting");

    let result = async {
        engine.connect(device)?.await?;
        engine.print(job)?.await
    }
    .await;

    engine.shutdown().await;
    drop(engine);
    let _ = tokio::time::timeout(Duration::from_secs(1), logger).await;

    result?;
    println!("Printed.");
    Ok(())
}

// -- internal helpers -------------------------------------------------------

async fn log_events(mut events: EventStream) {
    while let Some(event) = events.recv().await {
        log_event(&event);
    }
}

fn log_event(event: &PrinterEvent) {
    match event {
        PrinterEvent::RadioStateChanged { enabled } => tracing::info!(enabled, "radio state changed"),
        PrinterEvent::DeviceDiscovered(device) => {
            tracing::info!(address = %device.address, "device discovered")
        }
        PrinterEvent::ConnectionStateChanged { connected, device } => tracing::info!(
            connected,
            address = device.as_ref().map_or("-", |d| d.address.as_str()),
            "connection state changed"
        ),
        PrinterEvent::PrintSucceeded => tracing::info!("print succeeded"),
        PrinterEvent::Error { kind, message } => tracing::warn!(%kind, %message, "engine error"),
    }
}

/// Space-separated upper-case hex, 16 bytes per line.
fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
