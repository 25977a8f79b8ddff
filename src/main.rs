use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use tokio_util::sync::CancellationToken;

use healthedge_ble_lib::commands;
use healthedge_ble_lib::config::BleConfig;
use healthedge_ble_lib::logging::{self, LogMessage};
use healthedge_ble_lib::utils::JsonLinesWriter;

#[derive(Parser)]
#[command(name = "healthedge-ble", version, about = "Capture vital signs from Bluetooth health devices")]
struct Cli {
    /// Directory holding ble_config.json and the last connected device
    #[arg(long, global = true, default_value = ".healthedge")]
    config: PathBuf,

    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Write log records to stderr as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan for health devices and print them as JSON lines
    Scan,
    /// Connect to a device and print decoded vital signs as JSON lines
    Monitor {
        /// Device id or MAC address, defaults to the last connected device
        #[arg(long, conflicts_with = "simulate")]
        device: Option<String>,
        /// Use the built-in simulated peripheral
        #[arg(long)]
        simulate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_writer = if cli.json_logs {
        let (sink, writer) = JsonLinesWriter::spawn::<LogMessage, _>(std::io::stderr());
        logging::init_logging(cli.log_level, Some(sink));
        Some(writer)
    } else {
        logging::init_logging(cli.log_level, None);
        None
    };

    let result = run(cli).await;
    if let Some(writer) = log_writer {
        writer.finish().await;
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = BleConfig::load_config(&cli.config).await?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
                shutdown.cancel();
            }
        });
    }

    let (result, output) = match cli.command {
        Command::Scan => {
            let (events, output) = JsonLinesWriter::spawn(std::io::stdout());
            (commands::scan_devices(&config, events, shutdown).await, output)
        }
        Command::Monitor { simulate: true, .. } => {
            let (vitals, output) = JsonLinesWriter::spawn(std::io::stdout());
            (commands::monitor_simulated(&config, vitals, shutdown).await, output)
        }
        Command::Monitor { device, .. } => {
            let (vitals, output) = JsonLinesWriter::spawn(std::io::stdout());
            (commands::monitor_device(&config, &cli.config, device, vitals, shutdown).await, output)
        }
    };
    output.finish().await;
    result
}
