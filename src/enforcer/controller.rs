//! Route controller: load and flush as paired inverse operations.

use anyhow::Result;
use tracing::{debug, info};

use super::probe::StateProbe;
use super::rules::{build_plan, MANAGED_TABLES};
use super::FilterDriver;
use crate::cmd_abstraction::CommandExecutor;
use crate::config::RuleSpec;
use crate::error::TorgateError;

/// What a toggle ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Loaded,
    Flushed,
}

/// Owns the live filter tables for the duration of one action.
///
/// Flush clears the whole `filter` and `nat` tables of both families, not
/// only the rules added by [`load`](Self::load). Rules placed by other tools
/// are lost as well.
pub struct RouteController<'a, E: CommandExecutor + ?Sized> {
    driver: FilterDriver<'a, E>,
}

impl<'a, E: CommandExecutor + ?Sized> RouteController<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self {
            driver: FilterDriver::new(executor),
        }
    }

    /// Flush everything, then install the transparent-routing rules.
    ///
    /// Fails fast: the first failing command aborts the load and leaves the
    /// tables partially applied. [`flush`](Self::flush) restores them.
    pub fn load(&self, spec: &RuleSpec) -> Result<()> {
        if spec.identity.is_empty() {
            return Err(TorgateError::Config(
                "proxy daemon uid is not resolved; refusing to touch the filter".to_string(),
            )
            .into());
        }

        self.flush()?;

        let plan = build_plan(spec);
        for rule in &plan {
            self.driver.apply(rule)?;
        }

        info!(
            "Loaded {} transparent routing rules (TransPort {}, DNSPort {})",
            plan.len(),
            spec.ports.trans_port,
            spec.ports.dns_port
        );
        Ok(())
    }

    /// Clear the filter and nat tables of both families. Idempotent.
    pub fn flush(&self) -> Result<()> {
        for (family, table) in MANAGED_TABLES {
            self.driver.flush(family, table)?;
        }
        debug!("Flushed filter and nat tables (IPv4 and IPv6)");
        Ok(())
    }

    /// Flush if routing is active, load otherwise. Exactly one of the two runs.
    pub fn toggle(&self, spec: &RuleSpec, probe: &StateProbe<'_, E>) -> Result<ToggleOutcome> {
        if probe.is_active() {
            self.flush()?;
            Ok(ToggleOutcome::Flushed)
        } else {
            self.load(spec)?;
            Ok(ToggleOutcome::Loaded)
        }
    }
}
