//! Detect whether transparent routing is currently loaded.

use tracing::debug;

use super::rules::{Family, Table, CHAIN_OUTPUT};
use super::FilterDriver;
use crate::cmd_abstraction::CommandExecutor;

/// Reads the live IPv4 nat table on every call; nothing is cached.
///
/// This is a fingerprint, not a reconciliation: only the catch-all TCP
/// redirect to TransPort is looked for.
pub struct StateProbe<'a, E: CommandExecutor + ?Sized> {
    driver: FilterDriver<'a, E>,
    trans_port: u16,
}

impl<'a, E: CommandExecutor + ?Sized> StateProbe<'a, E> {
    pub fn new(executor: &'a E, trans_port: u16) -> Self {
        Self {
            driver: FilterDriver::new(executor),
            trans_port,
        }
    }

    /// True iff a TCP redirect to TransPort is present. Any failure to read
    /// the table counts as inactive.
    pub fn is_active(&self) -> bool {
        match self.driver.list_rules(Family::V4, Table::Nat) {
            Ok(rules) => has_trans_redirect(&rules, self.trans_port),
            Err(e) => {
                debug!("Cannot read nat table, assuming inactive: {:#}", e);
                false
            }
        }
    }
}

/// Look for `-A OUTPUT ... -p tcp ... -j REDIRECT --to-ports <port>` in `-S` output
fn has_trans_redirect(rules: &str, port: u16) -> bool {
    let port = port.to_string();
    rules.lines().any(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let in_output = tokens.len() > 1 && tokens[0] == "-A" && tokens[1] == CHAIN_OUTPUT;
        let is_tcp = tokens.windows(2).any(|w| w == ["-p", "tcp"]);
        let is_redirect = tokens.windows(2).any(|w| w == ["-j", "REDIRECT"]);
        let to_port = tokens
            .windows(2)
            .any(|w| w[0] == "--to-ports" && w[1] == port);
        in_output && is_tcp && is_redirect && to_port
    })
}
