//! Subcommand definitions for the admin CLI.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pulseonectl", version, about = "Inspect and control a running PulseOne collector")]
pub struct Cli {
    /// Base URL of the collector's introspection HTTP surface.
    #[arg(long, env = "PULSEONE_SERVER", default_value = "http://127.0.0.1:8088", global = true)]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every device known to the collector and whether it is running.
    List,
    /// Show one device's definition and run state.
    Show { id: i64 },
    /// List the data points configured on a device.
    Points { id: i64 },
    /// Show a device's connection state and driver statistics.
    Stats { id: i64 },
    /// Pause a device's worker without tearing it down.
    Pause { id: i64 },
    /// Resume a paused device's worker.
    Resume { id: i64 },
    /// Stop and respawn a device's worker from its boot-time definition.
    Reload { id: i64 },
    /// Open a live status dashboard polling every device on an interval.
    Status {
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
}
