//! Load command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::cmd_abstraction::CommandExecutor;
use crate::config::{Config, ProxyIdentity};
use crate::daemon;
use crate::enforcer::RouteController;

/// Run the load command
pub async fn run(config_path: &Path) -> Result<()> {
    let (config, executor) = super::prepare(config_path)?;

    let identity = ProxyIdentity::resolve(&executor, &config.proxy_user)?;
    let spec = config.rule_spec(identity);

    info!("Loading transparent routing rules...");
    RouteController::new(&executor)
        .load(&spec)
        .context("Failed to load rules; run 'torgate flush' to restore default packet filtering")?;

    after_load(&config, &executor).await
}

/// Restart the daemon so it picks up its ports, then show the new address
pub(crate) async fn after_load<E: CommandExecutor + ?Sized>(
    config: &Config,
    executor: &E,
) -> Result<()> {
    daemon::restart(executor, &config.daemon)
        .context("Rules are loaded but the proxy daemon could not be restarted")?;
    super::print_on();
    super::ip::report(config, executor).await
}
