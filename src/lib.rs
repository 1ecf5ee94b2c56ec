//! # torgate - transparent Tor routing for Linux hosts
//!
//! Rewrites the kernel packet filter so every outbound TCP connection and DNS
//! query goes through a local Tor daemon, and reports the resulting public
//! address.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        torgate                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: load, flush, toggle, refresh, ip, status   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── RuleSpec: exempt networks, proxy uid, redirect ports │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer                                                   │
//! │    ├── build_plan      ordered rule sequence (pure)         │
//! │    ├── FilterDriver    iptables / ip6tables commands        │
//! │    ├── RouteController load / flush / toggle                │
//! │    └── StateProbe      is routing active?                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reporter (reqwest + rustls)                                │
//! │    └── echo endpoint with retry, command fallback, country  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use torgate::cmd_abstraction::RealCommandExecutor;
//! use torgate::config::{Config, ProxyIdentity};
//! use torgate::enforcer::{check_root, RouteController, StateProbe};
//!
//! fn main() -> anyhow::Result<()> {
//!     check_root()?;
//!
//!     let config = Config::load_or_default("/etc/torgate/config.yaml")?;
//!     let executor = RealCommandExecutor::new();
//!     let identity = ProxyIdentity::resolve(&executor, &config.proxy_user)?;
//!
//!     let controller = RouteController::new(&executor);
//!     controller.load(&config.rule_spec(identity))?;
//!     assert!(StateProbe::new(&executor, config.trans_port).is_active());
//!
//!     controller.flush()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Safety contract
//!
//! Loading is fail-fast and does not roll back. Whatever state a failed or
//! interrupted load leaves behind, `flush` restores default-allow filtering.
//! Flush clears the entire `filter` and `nat` tables of both families, including
//! rules other tools added.
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - External command execution with timeouts
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration, rule specification, proxy identity
//! - [`daemon`] - Tor daemon presence, restart and reload
//! - [`enforcer`] - Rule plan, filter driver, route controller, state probe
//! - [`error`] - Error taxonomy
//! - [`reporter`] - Public address lookup
//! - [`torrc`] - Daemon configuration stanza

pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod enforcer;
pub mod error;
pub mod reporter;
pub mod torrc;

pub use cli::{Cli, Commands};
pub use config::{Config, RuleSpec};
pub use error::TorgateError;
