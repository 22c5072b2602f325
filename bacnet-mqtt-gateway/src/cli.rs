//! Command-line surface. Thin by design: every subcommand just loads
//! configuration and calls into `main.rs`'s composition root or a single
//! library function; no business logic lives here.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bacnet-mqtt-gateway", about = "BACnet/IP to MQTT bridge agent")]
pub struct Cli {
    /// Path to the gateway's YAML configuration file.
    #[arg(short, long, default_value = "gateway.yaml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the agent: monitor, upload, heartbeat, and command dispatch loops.
    Run,
    /// Validate the configuration file and exit without connecting to anything.
    CheckConfig,
    /// Write a default configuration file to the given path and exit.
    InitConfig {
        #[arg(short, long, default_value = "gateway.yaml")]
        output: String,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Run
    }
}
