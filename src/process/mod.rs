//! # Process-spawning seam.
//!
//! Starting, signalling and reaping the child is delegated to a [`Spawner`].
//! The supervisor only relies on:
//!
//! - [`Spawner::spawn`] starting a process from a [`SpawnInput`],
//! - [`ChildProcess::exited`] publishing the exit code exactly once,
//! - [`ChildProcess::stop`] returning only after the process is gone
//!   (graceful signal, then a forced kill after [`SpawnInput::kill_timeout`]).
//!
//! [`OsSpawner`] is the implementation backed by `tokio::process`.

mod command;
mod os;

use std::ffi::OsString;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio::sync::watch;

use crate::error::ProcessError;

pub use command::{PreparedCommand, command_prep};
pub use os::OsSpawner;

/// Upper bound for a graceful stop before the child is killed.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to start one child process.
///
/// There is no reload signal: a changed environment cannot be pushed into a
/// running process, it has to be restarted.
#[derive(Clone, Debug)]
pub struct SpawnInput {
    pub command: String,
    pub args: Vec<String>,
    /// Complete environment, applied in order (later entries win).
    pub env: Vec<(OsString, OsString)>,
    pub kill_signal: Signal,
    pub kill_timeout: Duration,
    /// Start the child in its own process group and signal the whole group.
    pub setpgid: bool,
}

impl SpawnInput {
    /// Value of `name` in the child environment, honouring later-wins.
    pub fn env_value(&self, name: &str) -> Option<&OsString> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// A started child process.
#[async_trait]
pub trait ChildProcess: Send + 'static {
    fn pid(&self) -> u32;

    /// Exit code once the process has ended (`None` while running).
    fn exited(&self) -> watch::Receiver<Option<i32>>;

    /// Stops the process and waits until it is gone.
    async fn stop(&mut self);
}

/// Starts child processes.
pub trait Spawner: Send + Sync + 'static {
    fn spawn(&self, input: SpawnInput) -> Result<Box<dyn ChildProcess>, ProcessError>;
}

/// Waits for the exit code published on `rx`.
///
/// Returns `None` if the publisher went away without reporting an exit.
pub async fn wait_exit(mut rx: watch::Receiver<Option<i32>>) -> Option<i32> {
    let code = rx.wait_for(Option::is_some).await.ok()?;
    *code
}
