//! Proxy daemon process control: presence check, restart and circuit reload.

use anyhow::Result;
use tracing::{debug, info};

use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::error::TorgateError;

/// Package managers probed for the install hint, with their install command
const PACKAGE_MANAGERS: &[(&str, &str)] = &[
    ("pacman", "sudo pacman -S"),
    ("apt", "sudo apt update && sudo apt install"),
    ("rpm", "sudo rpm -i"),
];

/// Check if a program can be executed
fn is_available<E: CommandExecutor + ?Sized>(executor: &E, program: &str) -> bool {
    executor
        .execute(program, &args_to_strings(&["--version"]))
        .is_ok()
}

/// Install instructions for `daemon` based on the host's package manager
pub fn install_hint<E: CommandExecutor + ?Sized>(executor: &E, daemon: &str) -> String {
    PACKAGE_MANAGERS
        .iter()
        .find(|(pm, _)| is_available(executor, pm))
        .map(|(_, cmd)| format!("To install {}, run:\n  {} {}", daemon, cmd, daemon))
        .unwrap_or_else(|| {
            format!(
                "Please install {} using your system package manager.",
                daemon
            )
        })
}

/// Fail with an install hint when the daemon binary is absent
pub fn require_installed<E: CommandExecutor + ?Sized>(executor: &E, daemon: &str) -> Result<()> {
    if is_available(executor, daemon) {
        return Ok(());
    }
    Err(TorgateError::NotInstalled(format!(
        "'{}' is not installed.\n{}",
        daemon,
        install_hint(executor, daemon)
    ))
    .into())
}

/// Restart the daemon's systemd unit
pub fn restart<E: CommandExecutor + ?Sized>(executor: &E, service: &str) -> Result<()> {
    let args = args_to_strings(&["restart", service]);
    let output = executor.execute("systemctl", &args)?;
    if !output.success {
        anyhow::bail!(
            "Command failed: systemctl {}: {}",
            args.join(" "),
            output.failure_reason()
        );
    }
    info!("Restarted {}", service);
    Ok(())
}

/// Send SIGHUP to every running instance so the daemon builds new circuits
pub fn reload<E: CommandExecutor + ?Sized>(executor: &E, daemon: &str) -> Result<()> {
    let output = executor.execute("pidof", &args_to_strings(&[daemon]))?;
    let pids: Vec<String> = output
        .stdout
        .split_whitespace()
        .filter(|p| p.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect();

    if pids.is_empty() {
        anyhow::bail!("{} is not running", daemon);
    }

    let mut args = vec!["-HUP".to_string()];
    args.extend(pids.iter().cloned());
    let output = executor.execute("kill", &args)?;
    if !output.success {
        anyhow::bail!("Failed to signal {}: {}", daemon, output.failure_reason());
    }

    debug!("Sent SIGHUP to {} ({})", daemon, pids.join(" "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};

    #[test]
    fn test_require_installed_present() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "tor" && args == ["--version".to_string()])
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("Tor version 0.4.8.10.\n")));

        assert!(require_installed(&mock, "tor").is_ok());
    }

    #[test]
    fn test_require_installed_missing_with_apt_hint() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(|cmd, _| match cmd {
            "apt" => Ok(CommandOutput::ok("apt 2.6.1")),
            _ => Err(anyhow::anyhow!("No such file or directory")),
        });

        let err = require_installed(&mock, "tor").unwrap_err();
        match err.downcast_ref::<TorgateError>() {
            Some(TorgateError::NotInstalled(msg)) => {
                assert!(msg.contains("sudo apt update && sudo apt install tor"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_install_hint_without_package_manager() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Err(anyhow::anyhow!("No such file or directory")));

        assert!(install_hint(&mock, "tor").contains("system package manager"));
    }

    #[test]
    fn test_install_hint_prefers_pacman() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Ok(CommandOutput::ok("")));

        assert!(install_hint(&mock, "tor").contains("sudo pacman -S tor"));
    }

    #[test]
    fn test_restart_failure() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "systemctl" && args == ["restart".to_string(), "tor".to_string()])
            .returning(|_, _| Ok(CommandOutput::failed(5, "Unit tor.service not found.")));

        let err = restart(&mock, "tor").unwrap_err();
        assert!(err.to_string().contains("systemctl restart tor"));
    }

    #[test]
    fn test_reload_signals_all_pids() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, _| cmd == "pidof")
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("812 411\n")));
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == "kill"
                    && args == ["-HUP".to_string(), "812".to_string(), "411".to_string()]
            })
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        assert!(reload(&mock, "tor").is_ok());
    }

    #[test]
    fn test_reload_not_running() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, _| cmd == "pidof")
            .returning(|_, _| Ok(CommandOutput::failed(1, "")));

        let err = reload(&mock, "tor").unwrap_err();
        assert!(err.to_string().contains("not running"));
    }
}
