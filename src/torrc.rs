//! Tor daemon configuration stanza.
//!
//! The daemon must expose a TransPort and DNSPort matching the redirect
//! targets. The stanza is appended once; the marker option guards against
//! appending it again.

use anyhow::{Context, Result};
use ipnet::IpNet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::config::RedirectPorts;

/// Option whose presence means the stanza was already written
pub const MARKER_OPTION: &str = "VirtualAddrNetwork";

/// Fixed stanza content for the given virtual network and ports
pub fn stanza(virtual_net: &IpNet, ports: &RedirectPorts) -> String {
    format!(
        "\n{} {}\nAutomapHostsOnResolve 1\nTransPort {}\nDNSPort {}\n",
        MARKER_OPTION, virtual_net, ports.trans_port, ports.dns_port
    )
}

/// Whether `content` already carries the stanza marker.
///
/// Works on raw bytes: torrc may hold comments in any encoding.
pub fn has_marker(content: &[u8]) -> bool {
    let marker = MARKER_OPTION.as_bytes();
    content.windows(marker.len()).any(|w| w == marker)
}

/// Append the stanza to `path` unless it is already there.
///
/// A missing file is left alone; returns whether anything was written.
pub fn ensure_stanza(path: &Path, virtual_net: &IpNet, ports: &RedirectPorts) -> Result<bool> {
    if !path.is_file() {
        debug!("{:?} does not exist, not patching", path);
        return Ok(false);
    }

    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    if has_marker(&content) {
        debug!("{:?} already contains {}", path, MARKER_OPTION);
        return Ok(false);
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?} for appending", path))?;
    file.write_all(stanza(virtual_net, ports).as_bytes())
        .with_context(|| format!("Failed to write {:?}", path))?;

    info!("Added transparent proxy settings to {:?}", path);
    Ok(true)
}
