//! # OS-backed child processes.
//!
//! ```text
//! OsSpawner::spawn(input)
//!   ├─ tokio::process::Command (inherited stdio, env_clear + input.env)
//!   ├─ process_group(0) when input.setpgid
//!   └─ reaper task: child.wait() ─► exited.send(Some(code))
//!
//! OsChild::stop()
//!   ├─ already exited?            → return
//!   ├─ kill(pid | -pgid, kill_signal)
//!   ├─ wait up to kill_timeout    → done
//!   └─ kill(pid | -pgid, SIGKILL) → wait
//! ```
//!
//! A process terminated by a signal reports exit code `-1`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::instrument::WithSubscriber;
use tracing::{debug, warn};

use super::{ChildProcess, SpawnInput, Spawner, wait_exit};
use crate::error::ProcessError;

/// Spawns real processes through `tokio::process`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsSpawner;

impl Spawner for OsSpawner {
    fn spawn(&self, input: SpawnInput) -> Result<Box<dyn ChildProcess>, ProcessError> {
        let mut cmd = Command::new(&input.command);
        cmd.args(&input.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .env_clear()
            .kill_on_drop(false);
        for (name, value) in &input.env {
            cmd.env(name, value);
        }
        if input.setpgid {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().ok_or(ProcessError::NoPid)?;

        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!(pid, error = %e, "failed to wait for child process");
                    -1
                }
            };
            debug!(pid, code, "child process exited");
            tx.send_replace(Some(code));
        }
        .with_current_subscriber());

        Ok(Box::new(OsChild {
            pid,
            exited: rx,
            kill_signal: input.kill_signal,
            kill_timeout: input.kill_timeout,
            setpgid: input.setpgid,
        }))
    }
}

/// A process started by [`OsSpawner`].
#[derive(Debug)]
pub struct OsChild {
    pid: u32,
    exited: watch::Receiver<Option<i32>>,
    kill_signal: Signal,
    kill_timeout: Duration,
    setpgid: bool,
}

impl OsChild {
    fn target(&self) -> i32 {
        let pid = self.pid as i32;
        if self.setpgid { -pid } else { pid }
    }

    fn signal(&self, sig: Signal) -> Result<(), ProcessError> {
        let pid = self.target();
        signal::kill(Pid::from_raw(pid), sig).map_err(|errno| ProcessError::Signal {
            pid,
            signal: sig,
            errno,
        })
    }

    fn has_exited(&self) -> bool {
        self.exited.borrow().is_some()
    }
}

#[async_trait]
impl ChildProcess for OsChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn exited(&self) -> watch::Receiver<Option<i32>> {
        self.exited.clone()
    }

    async fn stop(&mut self) {
        if self.has_exited() {
            return;
        }

        if let Err(e) = self.signal(self.kill_signal) {
            warn!(pid = self.pid, error = %e, "failed to signal child process");
        }
        let graceful = tokio::time::timeout(self.kill_timeout, wait_exit(self.exited.clone())).await;
        if graceful.is_ok() {
            return;
        }

        warn!(
            pid = self.pid,
            timeout = ?self.kill_timeout,
            "child process did not stop in time, killing"
        );
        if let Err(e) = self.signal(Signal::SIGKILL) {
            warn!(pid = self.pid, error = %e, "failed to kill child process");
        }
        let _ = wait_exit(self.exited.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;
    use crate::process::KILL_TIMEOUT;

    fn input(command: &str, args: &[&str]) -> SpawnInput {
        SpawnInput {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: vec![(OsString::from("PATH"), std::env::var_os("PATH").unwrap_or_default())],
            kill_signal: Signal::SIGTERM,
            kill_timeout: KILL_TIMEOUT,
            setpgid: false,
        }
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn reports_exit_code() {
        let child = OsSpawner.spawn(input("sh", &["-c", "exit 3"])).unwrap();
        assert!(child.pid() > 0);
        assert_eq!(wait_exit(child.exited()).await, Some(3));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn stop_terminates_long_running_child() {
        let mut child = OsSpawner.spawn(input("sleep", &["30"])).unwrap();
        child.stop().await;
        // SIGTERM kills `sleep`, which reports no exit code
        assert_eq!(*child.exited().borrow(), Some(-1));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn stop_escalates_to_sigkill() {
        let mut spec = input("sh", &["-c", "trap '' TERM; while true; do sleep 1; done"]);
        spec.kill_timeout = Duration::from_millis(200);
        spec.setpgid = true;
        let mut child = OsSpawner.spawn(spec).unwrap();

        // give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;
        child.stop().await;
        assert_eq!(*child.exited().borrow(), Some(-1));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn stop_after_exit_is_noop() {
        let mut child = OsSpawner.spawn(input("true", &[])).unwrap();
        assert_eq!(wait_exit(child.exited()).await, Some(0));
        child.stop().await;
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn missing_executable_fails_to_spawn() {
        let err = OsSpawner
            .spawn(input("/definitely/not/here", &[]))
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "process_spawn");
    }
}
