//! Toggle command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::ProxyIdentity;
use crate::enforcer::{RouteController, StateProbe, ToggleOutcome};

/// Run the toggle command: flush when routing is active, load otherwise
pub async fn run(config_path: &Path) -> Result<()> {
    let (config, executor) = super::prepare(config_path)?;

    let identity = ProxyIdentity::resolve(&executor, &config.proxy_user)?;
    let spec = config.rule_spec(identity);
    let probe = StateProbe::new(&executor, config.trans_port);

    let outcome = RouteController::new(&executor)
        .toggle(&spec, &probe)
        .context("Failed to toggle rules; run 'torgate flush' to restore default packet filtering")?;

    match outcome {
        ToggleOutcome::Loaded => super::load::after_load(&config, &executor).await,
        ToggleOutcome::Flushed => {
            super::print_off();
            Ok(())
        }
    }
}
