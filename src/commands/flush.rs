//! Flush command implementation.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::enforcer::RouteController;

/// Run the flush command
pub async fn run(config_path: &Path) -> Result<()> {
    let (_config, executor) = super::prepare(config_path)?;

    info!("Flushing packet filter rules...");
    RouteController::new(&executor).flush()?;

    super::print_off();
    Ok(())
}
