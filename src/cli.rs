//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "torgate")]
#[command(author, version, about = "Route all outbound traffic through Tor with iptables")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (built-in defaults are used if it does not exist)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output, including every iptables command)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load Tor iptables rules
    #[command(visible_alias = "l")]
    Load,

    /// Flush iptables rules to default
    #[command(visible_alias = "f")]
    Flush,

    /// Change the circuit and get a new IP
    #[command(visible_alias = "r")]
    Refresh,

    /// Output the current public IP address
    #[command(visible_alias = "i")]
    Ip,

    /// Toggle Tor iptables rules ON/OFF
    #[command(visible_alias = "t")]
    Toggle,

    /// Show whether transparent routing is active
    Status,

    /// Show version
    Version,
}
