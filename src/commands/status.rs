//! Status command implementation.

use anyhow::Result;
use std::path::Path;

use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::Config;
use crate::daemon;
use crate::enforcer::{check_root, StateProbe};

/// Run the status command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let executor = RealCommandExecutor::with_timeout(config.command_timeout());
    check_root()?;

    let installed = daemon::require_installed(&executor, &config.daemon).is_ok();
    let active = StateProbe::new(&executor, config.trans_port).is_active();

    println!();
    println!("Routing: {}", if active { "ON" } else { "OFF" });
    println!(
        "Daemon: {} ({})",
        config.daemon,
        if installed { "installed" } else { "NOT INSTALLED" }
    );
    println!("TransPort: {}", config.trans_port);
    println!("DNSPort: {}", config.dns_port);
    println!();

    Ok(())
}
