/*!
 * headset
 * Ask headsetd whether audio is going to a Bluetooth headset
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::{bail, Result};
use clap::Parser;

mod client;

use client::{HeadsetClient, HeadsetStatus, Response, GET_HEADSET_STATUS};

#[derive(Parser)]
#[command(name = "headset")]
#[command(about = "Query Bluetooth headset status from headsetd")]
struct Cli {
    /// Daemon socket path
    #[arg(short, long, default_value = "/run/headsetd/headsetd.sock")]
    socket: String,

    /// Method channel name
    #[arg(long, default_value = "inc.buddie.memx/headset")]
    channel: String,

    /// Method to invoke
    #[arg(short, long, default_value = GET_HEADSET_STATUS)]
    method: String,

    /// Print the raw JSON result
    #[arg(long)]
    json: bool,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("headset={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    let client = HeadsetClient::new(cli.socket, cli.channel);

    if cli.method == GET_HEADSET_STATUS && !cli.json {
        let status = client.headset_status().await?;
        print!("{}", render_status(&status));
        return Ok(());
    }

    match client.invoke(&cli.method).await? {
        Response::Success { result } => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Response::NotImplemented => bail!("{} is not implemented", cli.method),
        Response::Error { code, message, details } => match details {
            Some(details) => bail!("{}: {} ({})", code, message, details),
            None => bail!("{}: {}", code, message),
        },
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn render_status(status: &HeadsetStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("Headset:    {}\n", if status.connected { "connected" } else { "not connected" }));
    if let Some(name) = &status.name {
        out.push_str(&format!("Name:       {}\n", name));
    }
    if status.devices.len() > 1 {
        out.push_str(&format!("Devices:    {}\n", status.devices.join(", ")));
    }
    out.push_str(&format!("Bluetooth:  {}\n", if status.bluetooth_enabled { "on" } else { "off" }));
    out.push_str(&format!("Routed:     {}\n", yes_no(status.routed_to_bluetooth)));
    if status.reason != "ok" {
        out.push_str(&format!("Reason:     {}\n", status.reason));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(reason: &str, devices: &[&str]) -> HeadsetStatus {
        HeadsetStatus {
            connected: !devices.is_empty(),
            name: devices.first().map(|d| d.to_string()),
            devices: devices.iter().map(|d| d.to_string()).collect(),
            bluetooth_enabled: true,
            routed_to_bluetooth: false,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn renders_connected_headset() {
        let text = render_status(&status("ok", &["MyBuds", "Car Kit"]));
        assert!(text.contains("Headset:    connected"));
        assert!(text.contains("Name:       MyBuds"));
        assert!(text.contains("Devices:    MyBuds, Car Kit"));
        assert!(!text.contains("Reason"));
    }

    #[test]
    fn renders_reason_when_degraded() {
        let text = render_status(&status("bluetooth_connect_permission_missing", &[]));
        assert!(text.contains("not connected"));
        assert!(text.contains("Reason:     bluetooth_connect_permission_missing"));
        assert!(!text.contains("Name:"));
    }
}
