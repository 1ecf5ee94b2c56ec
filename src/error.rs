//! Error types for torgate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TorgateError {
    /// The proxy identity or another required setting could not be resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single filter-table command failed. Tables may be partially applied.
    #[error("Filter command failed: {program} {args}: {reason}")]
    FilterCommand {
        program: String,
        args: String,
        reason: String,
    },

    #[error("Address lookup failed: {0}")]
    AddressLookup(String),

    #[error("Permission denied: {0}")]
    Privilege(String),

    #[error("Not installed: {0}")]
    NotInstalled(String),
}

impl TorgateError {
    pub(crate) fn filter_command(program: &str, args: &[String], reason: impl Into<String>) -> Self {
        Self::FilterCommand {
            program: program.to_string(),
            args: args.join(" "),
            reason: reason.into(),
        }
    }
}
