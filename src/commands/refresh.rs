//! Refresh command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::daemon;

/// Ask the daemon for new circuits, then show the new address
pub async fn run(config_path: &Path) -> Result<()> {
    let (config, executor) = super::prepare(config_path)?;

    daemon::reload(&executor, &config.daemon).context("Failed to refresh circuits")?;

    super::ip::report(&config, &executor).await
}
