//! CLI command implementations.

pub mod flush;
pub mod ip;
pub mod load;
pub mod refresh;
pub mod status;
pub mod toggle;

use anyhow::Result;
use std::path::Path;
use tracing::warn;

use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::Config;
use crate::daemon;
use crate::enforcer::check_root;
use crate::torrc;

/// Common preamble of every privileged command: load config, require the
/// daemon binary and root, then make sure the daemon config has the stanza.
pub(crate) fn prepare(config_path: &Path) -> Result<(Config, RealCommandExecutor)> {
    let config = Config::load_or_default(config_path)?;
    let executor = RealCommandExecutor::with_timeout(config.command_timeout());

    daemon::require_installed(&executor, &config.daemon)?;
    check_root()?;

    patch_torrc(&config);

    Ok((config, executor))
}

/// Append the stanza to the daemon config. Never fails: `flush` must stay
/// usable whatever state the daemon config is in.
pub(crate) fn patch_torrc(config: &Config) -> bool {
    match torrc::ensure_stanza(
        Path::new(&config.torrc_path),
        &config.virtual_net,
        &config.ports(),
    ) {
        Ok(written) => written,
        Err(e) => {
            warn!("Could not patch {}: {:#}", config.torrc_path, e);
            false
        }
    }
}

pub(crate) fn print_on() {
    println!(" [+] Anonymizer status [ON]");
}

pub(crate) fn print_off() {
    println!(" [!] Anonymizer status [OFF]");
}
