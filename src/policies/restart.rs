//! # Restart policy for the supervised child process.
//!
//! [`RestartPolicy`] determines what happens to a running child when the
//! rendered secrets change.
//!
//! - [`RestartPolicy::Always`] the child is stopped and started again with the new environment (default).
//! - [`RestartPolicy::Never`] the child keeps running with the environment it was started with.
//!
//! The policy is configured as a string (`"always"` / `"never"`); anything else
//! is rejected with [`ConfigError::InvalidRestartPolicy`].
//!
//! ```text
//! secrets changed, child Running:
//!   RestartPolicy::Always  → Restarting → stop(old) → start(new env) → Running
//!   RestartPolicy::Never   → keep old process, discard new env
//!
//! secrets rendered, no child yet:
//!   either policy          → start(new env) → Running
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Policy controlling whether a running child is restarted after secrets change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Restart on every change (default).
    #[default]
    Always,
    /// Never restart a running child.
    Never,
}

impl RestartPolicy {
    /// Configuration spelling of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Always => "always",
            RestartPolicy::Never => "never",
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = ConfigError;

    /// Parses the configured value. Matching is exact: `"Always"` is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(RestartPolicy::Always),
            "never" => Ok(RestartPolicy::Never),
            other => Err(ConfigError::InvalidRestartPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
