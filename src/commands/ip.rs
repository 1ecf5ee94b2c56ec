//! Public address command implementation.

use anyhow::Result;
use std::path::Path;

use crate::cmd_abstraction::CommandExecutor;
use crate::config::Config;
use crate::reporter;

/// Run the ip command
pub async fn run(config_path: &Path) -> Result<()> {
    let (config, executor) = super::prepare(config_path)?;
    report(&config, &executor).await
}

/// Look up and print the externally visible address and its country
pub(crate) async fn report<E: CommandExecutor + ?Sized>(config: &Config, executor: &E) -> Result<()> {
    println!(" [*] Getting public IP, please wait...");

    let reporter = reporter::from_config(config, executor)?;
    let address = reporter.report().await?;
    let country = reporter::lookup_country(reporter.echo().client(), &address).await;

    println!(" [+] Your IP is {} ({})", address, country);
    Ok(())
}
