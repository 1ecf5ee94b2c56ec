//! Ordered rule sequence for transparent routing.
//!
//! Building the plan is pure: nothing here touches the packet filter, so the
//! ordering guarantees can be checked without root.

use crate::config::RuleSpec;

pub(crate) const CHAIN_OUTPUT: &str = "OUTPUT";

/// Protocol family, selecting `iptables` or `ip6tables`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn program(self) -> &'static str {
        match self {
            Family::V4 => "iptables",
            Family::V6 => "ip6tables",
        }
    }
}

/// Table a rule lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Generic accept/drop/reject table
    Filter,
    /// Address/port redirection table
    Nat,
}

impl Table {
    /// Selector arguments; `filter` is the implicit default.
    pub fn args(self) -> &'static [&'static str] {
        match self {
            Table::Filter => &[],
            Table::Nat => &["-t", "nat"],
        }
    }
}

/// Where a rule goes in its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Insert,
    Append,
}

impl Placement {
    fn flag(self) -> &'static str {
        match self {
            Placement::Insert => "-I",
            Placement::Append => "-A",
        }
    }
}

/// Every (family, table) pair load touches, in flush order.
pub const MANAGED_TABLES: [(Family, Table); 4] = [
    (Family::V4, Table::Filter),
    (Family::V4, Table::Nat),
    (Family::V6, Table::Filter),
    (Family::V6, Table::Nat),
];

/// A single filter-table mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub family: Family,
    pub table: Table,
    pub placement: Placement,
    pub chain: &'static str,
    /// Match and target arguments, e.g. `["-d", "10.0.0.0/8", "-j", "RETURN"]`
    pub spec: Vec<String>,
}

impl FilterRule {
    fn new(family: Family, table: Table, placement: Placement, spec: &[&str]) -> Self {
        Self {
            family,
            table,
            placement,
            chain: CHAIN_OUTPUT,
            spec: spec.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Full argument vector for the family's program
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self.table.args().iter().map(|s| s.to_string()).collect();
        args.push(self.placement.flag().to_string());
        args.push(self.chain.to_string());
        args.extend(self.spec.iter().cloned());
        args
    }

    /// Jump target (`RETURN`, `REDIRECT`, `ACCEPT`, ...)
    pub fn target(&self) -> Option<&str> {
        self.spec
            .iter()
            .position(|a| a == "-j")
            .and_then(|i| self.spec.get(i + 1))
            .map(String::as_str)
    }

    /// Destination network, if the rule matches on one (negated `! -d` does not count)
    pub fn destination(&self) -> Option<&str> {
        self.spec
            .iter()
            .enumerate()
            .find(|(i, a)| *a == "-d" && (*i == 0 || self.spec[*i - 1] != "!"))
            .and_then(|(i, _)| self.spec.get(i + 1))
            .map(String::as_str)
    }
}

/// Build the full rule sequence for `spec`.
///
/// Order is load-bearing and must not be rearranged:
/// fingerprint drops and the daemon exemption come before any redirect, every
/// destination exemption precedes the catch-all redirect, and every accept in
/// the filter chain precedes its final reject.
pub fn build_plan(spec: &RuleSpec) -> Vec<FilterRule> {
    use Family::{V4, V6};
    use Placement::{Append, Insert};
    use Table::{Filter, Nat};

    let lo = spec.networks.loopback_v4.to_string();
    let uid = spec.identity.as_str();
    let dns = spec.ports.dns_port.to_string();
    let trans = spec.ports.trans_port.to_string();
    let exempt: Vec<String> = spec
        .networks
        .non_proxy_v4
        .iter()
        .map(|n| n.to_string())
        .collect();

    let mut plan = Vec::with_capacity(10 + exempt.len() * 2);

    // Anti-fingerprinting: drop stray ACK+FIN / ACK+RST leaving the host
    for flags in ["ACK,FIN", "ACK,RST"] {
        plan.push(FilterRule::new(
            V4,
            Filter,
            Insert,
            &[
                "!", "-o", "lo", "!", "-d", &lo, "!", "-s", &lo, "-p", "tcp", "-m", "tcp",
                "--tcp-flags", flags, flags, "-j", "DROP",
            ],
        ));
    }

    plan.push(FilterRule::new(
        V4,
        Nat,
        Append,
        &["-m", "owner", "--uid-owner", uid, "-j", "RETURN"],
    ));
    plan.push(FilterRule::new(
        V4,
        Nat,
        Append,
        &["-p", "udp", "--dport", &dns, "-j", "REDIRECT", "--to-ports", &dns],
    ));
    for net in &exempt {
        plan.push(FilterRule::new(V4, Nat, Append, &["-d", net, "-j", "RETURN"]));
    }
    plan.push(FilterRule::new(
        V4,
        Nat,
        Append,
        &["-p", "tcp", "--syn", "-j", "REDIRECT", "--to-ports", &trans],
    ));

    plan.push(FilterRule::new(
        V4,
        Filter,
        Append,
        &["-m", "state", "--state", "ESTABLISHED,RELATED", "-j", "ACCEPT"],
    ));
    for net in &exempt {
        plan.push(FilterRule::new(V4, Filter, Append, &["-d", net, "-j", "ACCEPT"]));
    }
    plan.push(FilterRule::new(
        V4,
        Filter,
        Append,
        &["-m", "owner", "--uid-owner", uid, "-j", "ACCEPT"],
    ));
    plan.push(FilterRule::new(V4, Filter, Append, &["-j", "REJECT"]));

    // No transparent redirect for IPv6: only the daemon may talk
    plan.push(FilterRule::new(
        V6,
        Filter,
        Append,
        &["-m", "owner", "--uid-owner", uid, "-j", "ACCEPT"],
    ));
    plan.push(FilterRule::new(V6, Filter, Append, &["-j", "REJECT"]));

    plan
}
