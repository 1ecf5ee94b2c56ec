//! Configuration and rule specification for torgate.
//!
//! [`Config`] holds the tunables (ports, exempt networks, endpoints) and may be
//! overridden from a YAML file. [`RuleSpec`] is the validated, per-invocation
//! input to the route controller.

use anyhow::{Context, Result};
use ipnet::IpNet;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::error::TorgateError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/torgate/config.yaml";

/// Numeric uid of the account the proxy daemon runs under.
///
/// Traffic owned by this uid is exempt from redirection; without it the
/// daemon's own circuits would loop back into its TransPort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyIdentity(String);

impl ProxyIdentity {
    /// Wrap an already-known uid. Rejects empty and non-numeric values.
    pub fn new(uid: impl Into<String>) -> Result<Self, TorgateError> {
        let uid = uid.into().trim().to_string();
        if uid.is_empty() {
            return Err(TorgateError::Config("proxy daemon uid is empty".to_string()));
        }
        if !uid.chars().all(|c| c.is_ascii_digit()) {
            return Err(TorgateError::Config(format!(
                "proxy daemon uid '{}' is not numeric",
                uid
            )));
        }
        Ok(Self(uid))
    }

    /// Look up the uid of `user` in the host's user database (`id -ur`).
    pub fn resolve<E: CommandExecutor + ?Sized>(executor: &E, user: &str) -> Result<Self> {
        let output = executor
            .execute("id", &args_to_strings(&["-ur", user]))
            .map_err(|e| TorgateError::Config(format!("cannot run 'id -ur {}': {}", user, e)))?;

        if !output.success {
            return Err(TorgateError::Config(format!(
                "failed to get uid for '{}' user ({}). Make sure the '{}' user exists",
                user,
                output.failure_reason(),
                user
            ))
            .into());
        }

        let identity = Self::new(output.stdout.trim())?;
        debug!("Resolved proxy user {} to uid {}", user, identity);
        Ok(identity)
    }

    /// Identity that has not been resolved. Only useful to exercise the
    /// empty-identity guard in the route controller.
    pub fn unresolved() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ProxyIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local ports the proxy daemon listens on for redirected traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPorts {
    /// TCP transparent-redirect target
    pub trans_port: u16,
    /// UDP DNS-redirect target
    pub dns_port: u16,
}

impl Default for RedirectPorts {
    fn default() -> Self {
        Self {
            trans_port: 9040,
            dns_port: 53,
        }
    }
}

/// Destinations that bypass the proxy.
///
/// Order is kept exactly as configured. Overlapping ranges are harmless
/// since the filter is first-match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSets {
    pub loopback_v4: Ipv4Addr,
    pub loopback_v6: Ipv6Addr,
    pub non_proxy_v4: Vec<IpNet>,
    pub non_proxy_v6: Vec<IpNet>,
}

impl Default for NetworkSets {
    fn default() -> Self {
        Self {
            loopback_v4: Ipv4Addr::LOCALHOST,
            loopback_v6: Ipv6Addr::LOCALHOST,
            non_proxy_v4: default_non_proxy_v4(),
            non_proxy_v6: default_non_proxy_v6(),
        }
    }
}

/// Everything the route controller needs to build the rule sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub networks: NetworkSets,
    pub identity: ProxyIdentity,
    pub ports: RedirectPorts,
}

impl RuleSpec {
    pub fn new(networks: NetworkSets, identity: ProxyIdentity, ports: RedirectPorts) -> Self {
        Self {
            networks,
            identity,
            ports,
        }
    }

    /// Default networks and ports for the given identity
    pub fn with_identity(identity: ProxyIdentity) -> Self {
        Self::new(NetworkSets::default(), identity, RedirectPorts::default())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// System account the proxy daemon runs as
    pub proxy_user: String,

    /// Name of the daemon binary and of its systemd unit
    pub daemon: String,

    pub trans_port: u16,
    pub dns_port: u16,

    /// VirtualAddrNetwork written to the daemon config
    pub virtual_net: IpNet,

    pub loopback_v4: Ipv4Addr,
    pub loopback_v6: Ipv6Addr,

    /// IPv4 destinations exempt from redirection (loopback and private ranges)
    pub non_proxy_v4: Vec<IpNet>,

    /// IPv6 local/private ranges
    pub non_proxy_v6: Vec<IpNet>,

    /// Daemon config file patched with the transparent-proxy stanza
    pub torrc_path: String,

    /// Address-echo endpoint returning `{"IP": "..."}`
    pub echo_url: String,

    pub lookup_attempts: u32,
    pub retry_delay_secs: u64,

    /// Plain-text lookup used once the echo endpoint gives up
    pub fallback_command: Vec<String>,

    /// Upper bound for each external command, in seconds
    pub command_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let ports = RedirectPorts::default();
        let networks = NetworkSets::default();
        Self {
            proxy_user: "tor".to_string(),
            daemon: "tor".to_string(),
            trans_port: ports.trans_port,
            dns_port: ports.dns_port,
            virtual_net: default_virtual_net(),
            loopback_v4: networks.loopback_v4,
            loopback_v6: networks.loopback_v6,
            non_proxy_v4: networks.non_proxy_v4,
            non_proxy_v6: networks.non_proxy_v6,
            torrc_path: "/etc/tor/torrc".to_string(),
            echo_url: "https://check.torproject.org/api/ip".to_string(),
            lookup_attempts: 12,
            retry_delay_secs: 5,
            fallback_command: vec![
                "wget".to_string(),
                "-qO".to_string(),
                "-".to_string(),
                "ident.me".to_string(),
            ],
            command_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise use built-in defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            debug!("No config at {:?}, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.proxy_user.trim().is_empty() {
            anyhow::bail!(TorgateError::Config("proxy_user cannot be empty".to_string()));
        }
        if self.daemon.trim().is_empty() {
            anyhow::bail!(TorgateError::Config("daemon cannot be empty".to_string()));
        }
        if self.trans_port == 0 || self.dns_port == 0 {
            anyhow::bail!(TorgateError::Config(
                "trans_port and dns_port must be non-zero".to_string()
            ));
        }
        if !self.virtual_net.addr().is_ipv4() {
            anyhow::bail!(TorgateError::Config(format!(
                "virtual_net must be an IPv4 network: {}",
                self.virtual_net
            )));
        }
        if let Some(net) = self.non_proxy_v4.iter().find(|n| !matches!(n, IpNet::V4(_))) {
            anyhow::bail!(TorgateError::Config(format!(
                "non_proxy_v4 contains a non-IPv4 network: {}",
                net
            )));
        }
        if let Some(net) = self.non_proxy_v6.iter().find(|n| !matches!(n, IpNet::V6(_))) {
            anyhow::bail!(TorgateError::Config(format!(
                "non_proxy_v6 contains a non-IPv6 network: {}",
                net
            )));
        }
        if !self.echo_url.starts_with("https://") {
            anyhow::bail!(TorgateError::Config(format!(
                "echo_url must use HTTPS: {}",
                self.echo_url
            )));
        }
        if self.lookup_attempts == 0 {
            anyhow::bail!(TorgateError::Config(
                "lookup_attempts must be at least 1".to_string()
            ));
        }
        if self.fallback_command.is_empty() {
            anyhow::bail!(TorgateError::Config(
                "fallback_command cannot be empty".to_string()
            ));
        }
        if self.command_timeout_secs == 0 {
            anyhow::bail!(TorgateError::Config(
                "command_timeout_secs must be at least 1".to_string()
            ));
        }
        Ok(())
    }

    pub fn ports(&self) -> RedirectPorts {
        RedirectPorts {
            trans_port: self.trans_port,
            dns_port: self.dns_port,
        }
    }

    pub fn networks(&self) -> NetworkSets {
        NetworkSets {
            loopback_v4: self.loopback_v4,
            loopback_v6: self.loopback_v6,
            non_proxy_v4: self.non_proxy_v4.clone(),
            non_proxy_v6: self.non_proxy_v6.clone(),
        }
    }

    /// Build the rule specification for a resolved identity
    pub fn rule_spec(&self, identity: ProxyIdentity) -> RuleSpec {
        RuleSpec::new(self.networks(), identity, self.ports())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn parse_nets(nets: &[&str]) -> Vec<IpNet> {
    nets.iter().filter_map(|n| n.parse().ok()).collect()
}

fn default_virtual_net() -> IpNet {
    let base = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0));
    IpNet::new(base, 10).unwrap_or_else(|_| IpNet::from(base))
}

/// Loopback blocks followed by RFC 1918 ranges, in filter order.
pub fn default_non_proxy_v4() -> Vec<IpNet> {
    parse_nets(&[
        "127.0.0.0/9",
        "127.128.0.0/10",
        "127.0.0.0/8",
        "192.168.0.0/16",
        "172.16.0.0/12",
    ])
}

pub fn default_non_proxy_v6() -> Vec<IpNet> {
    parse_nets(&[
        "fc00::/7",
        "fe80::/10",
        "fec0::/10",
        "ff00::/8",
        "::1/128",
        "::ffff:0:0/96",
    ])
}
