//! Packet-filter enforcement: rule plan, driver, route controller and probe.

mod controller;
mod probe;
mod rules;

use anyhow::Result;
use tracing::debug;

pub use controller::{RouteController, ToggleOutcome};
pub use probe::StateProbe;
pub use rules::{build_plan, Family, FilterRule, Placement, Table, MANAGED_TABLES};

use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::error::TorgateError;

/// Thin wrapper issuing `iptables`/`ip6tables` commands through a [`CommandExecutor`].
///
/// Every call is a single synchronous command; a non-zero exit or a spawn
/// failure becomes [`TorgateError::FilterCommand`].
pub struct FilterDriver<'a, E: CommandExecutor + ?Sized> {
    executor: &'a E,
}

impl<'a, E: CommandExecutor + ?Sized> FilterDriver<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// Remove every rule from `table` for `family`
    pub fn flush(&self, family: Family, table: Table) -> Result<()> {
        let mut args = args_to_strings(table.args());
        args.push("-F".to_string());
        self.run(family.program(), &args).map(|_| ())
    }

    /// Insert or append a single rule
    pub fn apply(&self, rule: &FilterRule) -> Result<()> {
        self.run(rule.family.program(), &rule.to_args()).map(|_| ())
    }

    /// Current rules of `table` in `-S` (save) format
    pub fn list_rules(&self, family: Family, table: Table) -> Result<String> {
        let mut args = args_to_strings(table.args());
        args.push("-S".to_string());
        self.run(family.program(), &args)
    }

    fn run(&self, program: &str, args: &[String]) -> Result<String> {
        debug!("{} {}", program, args.join(" "));
        let output = self
            .executor
            .execute(program, args)
            .map_err(|e| TorgateError::filter_command(program, args, e.to_string()))?;

        if !output.success {
            return Err(TorgateError::filter_command(program, args, output.failure_reason()).into());
        }
        Ok(output.stdout)
    }
}

/// Check if running as root (effective UID == 0)
///
/// iptables needs CAP_NET_ADMIN; the uid check covers the common sudo case.
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() has no preconditions, never fails and touches no state.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(TorgateError::Privilege(
            "this operation requires root privileges. Please run with sudo".to_string(),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};

    #[test]
    fn test_flush_nat_args() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == "ip6tables"
                    && args == ["-t".to_string(), "nat".to_string(), "-F".to_string()]
            })
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let driver = FilterDriver::new(&mock);
        assert!(driver.flush(Family::V6, Table::Nat).is_ok());
    }

    #[test]
    fn test_flush_filter_args() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "iptables" && args == ["-F".to_string()])
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let driver = FilterDriver::new(&mock);
        assert!(driver.flush(Family::V4, Table::Filter).is_ok());
    }

    #[test]
    fn test_non_zero_exit_is_filter_error() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Ok(CommandOutput::failed(2, "Bad argument `--syn'")));

        let driver = FilterDriver::new(&mock);
        let err = driver.flush(Family::V4, Table::Nat).unwrap_err();
        match err.downcast_ref::<TorgateError>() {
            Some(TorgateError::FilterCommand { program, args, reason }) => {
                assert_eq!(program, "iptables");
                assert_eq!(args, "-t nat -F");
                assert!(reason.contains("Bad argument"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_binary_is_filter_error() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Err(anyhow::anyhow!("No such file or directory")));

        let driver = FilterDriver::new(&mock);
        let err = driver.list_rules(Family::V4, Table::Nat).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TorgateError>(),
            Some(TorgateError::FilterCommand { .. })
        ));
    }

    #[test]
    fn test_list_rules_returns_stdout() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == "iptables"
                    && args == ["-t".to_string(), "nat".to_string(), "-S".to_string()]
            })
            .returning(|_, _| Ok(CommandOutput::ok("-P OUTPUT ACCEPT\n")));

        let driver = FilterDriver::new(&mock);
        assert_eq!(
            driver.list_rules(Family::V4, Table::Nat).unwrap(),
            "-P OUTPUT ACCEPT\n"
        );
    }

    #[test]
    fn test_check_root_error_kind() {
        // Outcome depends on who runs the tests; only the error kind is checked.
        if let Err(e) = check_root() {
            assert!(matches!(
                e.downcast_ref::<TorgateError>(),
                Some(TorgateError::Privilege(_))
            ));
        }
    }
}
