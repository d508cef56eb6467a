//! Command-line interface definitions for the agent.

use std::env;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the handover controller until terminated.
    Service(ServiceArgs),

    /// Print radio status, interface addresses and the current scan table, then exit.
    Probe {
        /// Path to the configuration file
        #[arg(short, long, default_value = "linkshift_agent.toml", env = "LINKSHIFT_CONFIG")]
        config: String,
    },

    /// Receive the load generator's datagrams and report throughput.
    Sink(SinkArgs),
}

/// Arguments for the service command.
#[derive(Debug, Parser)]
pub struct ServiceArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "linkshift_agent.toml", env = "LINKSHIFT_CONFIG")]
    pub config: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[derive(Debug, Parser)]
pub struct SinkArgs {
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, default_value_t = 5001)]
    pub port: u16,

    /// Seconds between throughput reports
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub report_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
    Pretty,
}
