//! # pulseonectl
//!
//! Admin CLI for a running PulseOne collector: read-only introspection
//! (`list`, `show`, `points`, `stats`) plus the process-control verbs
//! exposed over `pulseone-server`'s HTTP surface (`pause`, `resume`,
//! `reload`), and a `status` live dashboard.

mod cli;
mod client;
mod tui;

use clap::Parser;
use cli::{Cli, Command};
use client::Client;
use pulseone_model::DeviceId;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulseonectl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let client = Client::new(cli.server.trim_end_matches('/').to_string());

    match cli.command {
        Command::List => {
            let devices = client.list_devices().await?;
            print_json(&devices)?;
        }
        Command::Show { id } => {
            let device = client.get_device(DeviceId(id)).await?;
            print_json(&device)?;
        }
        Command::Points { id } => {
            let points = client.get_points(DeviceId(id)).await?;
            print_json(&points)?;
        }
        Command::Stats { id } => {
            let stats = client.get_stats(DeviceId(id)).await?;
            print_json(&stats)?;
        }
        Command::Pause { id } => {
            client.pause(DeviceId(id)).await?;
            println!("device {id} paused");
        }
        Command::Resume { id } => {
            client.resume(DeviceId(id)).await?;
            println!("device {id} resumed");
        }
        Command::Reload { id } => {
            client.reload(DeviceId(id)).await?;
            println!("device {id} reloaded");
        }
        Command::Status { interval_secs } => {
            tui::run(client, Duration::from_secs(interval_secs.max(1))).await?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
