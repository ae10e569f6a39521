/*!
 * headsetd
 * Bluetooth headset status over a method channel
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

mod channel;
mod config;
mod ipc;
mod platform;
mod status;

use channel::{ChannelRegistry, HeadsetChannel};
use config::DaemonConfig;
use ipc::IpcServer;
use status::HeadsetStatusQuery;

#[derive(Parser)]
#[command(name = "headsetd")]
#[command(about = "Bluetooth headset status daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/headsetd/headsetd.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the method channel on the configured socket
    Run,
    /// Query headset status once and print it as JSON
    Query,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("headsetd={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    let config = DaemonConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::Query => query_once(config).await,
    }
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    info!("headsetd starting...");

    let platform = platform::build(&config.platform)?;

    let mut registry = ChannelRegistry::new();
    registry.register(config.channel.clone(), Arc::new(HeadsetChannel::new(platform)));

    let listener = ipc::bind_socket(&config.socket_path)?;
    let ipc_server = IpcServer::new(listener, registry);

    info!("headsetd ready on socket: {}", config.socket_path);

    tokio::select! {
        result = ipc_server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    let _ = std::fs::remove_file(&config.socket_path);
    Ok(())
}

async fn query_once(config: DaemonConfig) -> Result<()> {
    let platform = platform::build(&config.platform)?;
    let status =
        tokio::task::spawn_blocking(move || HeadsetStatusQuery::new(platform.as_ref()).query())
            .await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
