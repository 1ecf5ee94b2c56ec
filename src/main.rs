//! torgate - transparent Tor routing for Linux hosts.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use torgate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Load => torgate::commands::load::run(&cli.config).await,
        Commands::Flush => torgate::commands::flush::run(&cli.config).await,
        Commands::Refresh => torgate::commands::refresh::run(&cli.config).await,
        Commands::Ip => torgate::commands::ip::run(&cli.config).await,
        Commands::Toggle => torgate::commands::toggle::run(&cli.config).await,
        Commands::Status => torgate::commands::status::run(&cli.config).await,
        Commands::Version => {
            println!("torgate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
