//! # Lifecycle: owner of the single child process.
//!
//! Applies the [`RestartPolicy`] whenever a complete set of rendered secrets
//! arrives, and starts the child with the supervisor's environment plus the
//! rendered assignments.
//!
//! ## Bounce flow
//! ```text
//! bounce(env)
//!   ├─► parse policy (unknown value → ConfigError, nothing started or stopped)
//!   ├─► prepare command (sh -c for a single shell string)
//!   ├─► Running?
//!   │     ├─ already exited → AlreadyExited(code), nothing stopped or started
//!   │     ├─ Always → Restarting → cancel watcher(old) → stop(old)
//!   │     └─ Never  → ProcessRestartSkipped, Kept
//!   ├─► spawn(env = vars_os() ++ rendered, kill signal, 30s kill timeout)
//!   ├─► generation += 1, spawn exit watcher(generation, fresh token)
//!   └─► Running
//! ```
//!
//! ## Exit watchers
//! Every process instance gets its own watcher task and its own
//! [`CancellationToken`]. The token is handed to the task at spawn time and is
//! cancelled **before** the process is stopped on purpose, so an intentional
//! stop is never reported as an unsolicited exit. Exit signals also carry the
//! instance generation; a signal from a superseded instance is discarded.
//!
//! A child may exit while its exit signal is still queued behind a render
//! batch. `bounce` therefore checks the exit status before stopping anything
//! and hands the exit back as [`Bounced::AlreadyExited`] instead of replacing
//! a dead process.

use std::ffi::OsString;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::state::ChildProcessState;
use crate::config::ExecConfig;
use crate::error::{BounceError, StateError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::RestartPolicy;
use crate::process::{ChildProcess, KILL_TIMEOUT, SpawnInput, Spawner, command_prep, wait_exit};
use crate::render::EnvVar;

/// Exit code of one process instance, forwarded to the supervisor loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitSignal {
    /// Process instance number (1-based, increments on every start).
    pub generation: u64,
    /// OS exit code.
    pub code: i32,
}

/// What a bounce did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bounced {
    /// A new instance is running.
    Started { pid: u32, generation: u64 },
    /// Policy `never`: the running instance was kept.
    Kept,
    /// The running instance had already exited on its own.
    AlreadyExited(ExitSignal),
}

/// The process currently supervised, with the token of its watcher.
struct RunningChild {
    process: Box<dyn ChildProcess>,
    generation: u64,
    watcher: CancellationToken,
}

/// Child lifecycle controller. Single writer: only the supervisor loop calls it.
pub struct Lifecycle {
    exec: ExecConfig,
    spawner: Arc<dyn Spawner>,
    bus: Bus,
    state: ChildProcessState,
    current: Option<RunningChild>,
    generation: u64,
    exit_tx: mpsc::Sender<ExitSignal>,
}

impl Lifecycle {
    /// Creates the controller and the receiving end of its exit notifications.
    pub fn new(
        exec: ExecConfig,
        spawner: Arc<dyn Spawner>,
        bus: Bus,
    ) -> (Self, mpsc::Receiver<ExitSignal>) {
        let (exit_tx, exit_rx) = mpsc::channel(4);
        let lifecycle = Self {
            exec,
            spawner,
            bus,
            state: ChildProcessState::NotStarted,
            current: None,
            generation: 0,
            exit_tx,
        };
        (lifecycle, exit_rx)
    }

    pub fn state(&self) -> ChildProcessState {
        self.state
    }

    /// Pid of the running child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.current.as_ref().map(|c| c.process.pid())
    }

    /// Number of processes started so far.
    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Applies the restart policy for a freshly rendered environment.
    pub async fn bounce(&mut self, env: Vec<EnvVar>) -> Result<Bounced, BounceError> {
        let policy = self.exec.restart_policy()?;
        let command = command_prep(&self.exec.command)?;

        if self.state.is_running() {
            if let Some(exit) = self.exited_on_its_own() {
                debug!(
                    generation = exit.generation,
                    code = exit.code,
                    "process already exited, not bouncing"
                );
                return Ok(Bounced::AlreadyExited(exit));
            }
            match policy {
                RestartPolicy::Always => self.stop_current("restart").await?,
                RestartPolicy::Never => {
                    let pid = self.pid().unwrap_or_default();
                    self.bus
                        .publish(Event::new(EventKind::ProcessRestartSkipped).with_pid(pid));
                    return Ok(Bounced::Kept);
                }
            }
        }

        if !self.state.can_transition(ChildProcessState::Running) {
            return Err(StateError {
                from: self.state,
                to: ChildProcessState::Running,
            }
            .into());
        }

        let rendered = env.len();
        let mut child_env: Vec<(OsString, OsString)> = std::env::vars_os().collect();
        child_env.extend(env.into_iter().map(|e| (OsString::from(e.name), e.value)));

        let process = self.spawner.spawn(SpawnInput {
            command: command.program,
            args: command.args,
            env: child_env,
            kill_signal: self.exec.restart_stop_signal,
            kill_timeout: KILL_TIMEOUT,
            setpgid: command.subshell,
        })?;

        self.generation += 1;
        let generation = self.generation;
        let watcher = CancellationToken::new();
        self.spawn_exit_watcher(process.as_ref(), generation, watcher.clone());

        let pid = process.pid();
        self.current = Some(RunningChild {
            process,
            generation,
            watcher,
        });
        self.state.transition(ChildProcessState::Running)?;

        self.bus.publish(
            Event::new(EventKind::ProcessStarted)
                .with_pid(pid)
                .with_generation(generation)
                .with_count(rendered),
        );
        Ok(Bounced::Started { pid, generation })
    }

    /// Exit of the current instance, if it ended before anyone stopped it.
    fn exited_on_its_own(&self) -> Option<ExitSignal> {
        let child = self.current.as_ref()?;
        let code = *child.process.exited().borrow();
        code.map(|code| ExitSignal {
            generation: child.generation,
            code,
        })
    }

    /// Checks an exit signal against the current instance.
    ///
    /// Returns the exit code when it belongs to the running child; stale
    /// signals from superseded instances yield `None`.
    pub fn accept_exit(&self, signal: ExitSignal) -> Option<i32> {
        match &self.current {
            Some(child) if child.generation == signal.generation => Some(signal.code),
            _ => {
                debug!(
                    generation = signal.generation,
                    code = signal.code,
                    "ignoring exit of superseded process"
                );
                None
            }
        }
    }

    /// Stops the child (if any) and moves to `Stopped`.
    pub async fn shutdown(&mut self) {
        if let Some(child) = self.current.take() {
            Self::stop_child(&self.bus, child, "shutdown").await;
        }
        if self.state != ChildProcessState::Stopped {
            debug_assert!(self.state.can_transition(ChildProcessState::Stopped));
            self.state = ChildProcessState::Stopped;
        }
    }

    async fn stop_current(&mut self, reason: &'static str) -> Result<(), StateError> {
        self.state.transition(ChildProcessState::Restarting)?;
        if let Some(child) = self.current.take() {
            Self::stop_child(&self.bus, child, reason).await;
        }
        Ok(())
    }

    async fn stop_child(bus: &Bus, mut child: RunningChild, reason: &'static str) {
        let pid = child.process.pid();
        bus.publish(
            Event::new(EventKind::ProcessStopping)
                .with_pid(pid)
                .with_generation(child.generation)
                .with_reason(reason),
        );
        child.watcher.cancel();
        child.process.stop().await;
    }

    /// Forwards this instance's exit to the supervisor unless `token` is cancelled first.
    fn spawn_exit_watcher(
        &self,
        process: &dyn ChildProcess,
        generation: u64,
        token: CancellationToken,
    ) {
        let exited = process.exited();
        let tx = self.exit_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                code = wait_exit(exited) => {
                    if let Some(code) = code {
                        let _ = tx.send(ExitSignal { generation, code }).await;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use nix::sys::signal::Signal;
    use tokio::sync::watch;

    use super::*;
    use crate::config::ExecConfig;
    use crate::error::{ConfigError, ProcessError};

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Op {
        Spawned { pid: u32 },
        Stopped { pid: u32, watchers_left: usize },
    }

    /// Spawner handing out fake processes and recording what happens to them.
    #[derive(Clone, Default)]
    struct FakeSpawner {
        ops: Arc<Mutex<Vec<Op>>>,
        inputs: Arc<Mutex<Vec<SpawnInput>>>,
        exits: Arc<Mutex<Vec<watch::Sender<Option<i32>>>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl FakeSpawner {
        fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().clone()
        }

        fn inputs(&self) -> Vec<SpawnInput> {
            self.inputs.lock().unwrap().clone()
        }

        /// Makes process `index` (0-based) exit on its own.
        fn exit(&self, index: usize, code: i32) {
            self.exits.lock().unwrap()[index].send_replace(Some(code));
        }
    }

    struct FakeChild {
        pid: u32,
        exited: watch::Sender<Option<i32>>,
        ops: Arc<Mutex<Vec<Op>>>,
    }

    #[async_trait]
    impl ChildProcess for FakeChild {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn exited(&self) -> watch::Receiver<Option<i32>> {
            self.exited.subscribe()
        }

        async fn stop(&mut self) {
            // let a cancelled watcher observe its token and drop its receiver
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            self.ops.lock().unwrap().push(Op::Stopped {
                pid: self.pid,
                watchers_left: self.exited.receiver_count(),
            });
            self.exited.send_replace(Some(-1));
        }
    }

    impl Spawner for FakeSpawner {
        fn spawn(&self, input: SpawnInput) -> Result<Box<dyn ChildProcess>, ProcessError> {
            if *self.fail.lock().unwrap() {
                return Err(ProcessError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such file",
                )));
            }
            let mut exits = self.exits.lock().unwrap();
            let pid = 100 + exits.len() as u32;
            let (tx, _rx) = watch::channel(None);
            exits.push(tx.clone());
            self.inputs.lock().unwrap().push(input);
            self.ops.lock().unwrap().push(Op::Spawned { pid });
            Ok(Box::new(FakeChild {
                pid,
                exited: tx,
                ops: Arc::clone(&self.ops),
            }))
        }
    }

    fn lifecycle(policy: &str, spawner: &FakeSpawner) -> (Lifecycle, mpsc::Receiver<ExitSignal>) {
        let exec = ExecConfig {
            command: vec!["./app".into(), "--serve".into()],
            restart_on_secret_changes: policy.into(),
            restart_stop_signal: Signal::SIGINT,
        };
        Lifecycle::new(exec, Arc::new(spawner.clone()), Bus::new(16))
    }

    fn env(pairs: &[(&str, &str)]) -> Vec<EnvVar> {
        pairs.iter().map(|(k, v)| EnvVar::new(*k, *v)).collect()
    }

    #[tokio::test]
    async fn first_bounce_starts_process_with_merged_env() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("always", &spawner);

        lc.bounce(env(&[("FOO", "bar"), ("BAZ", "qux")])).await.unwrap();

        assert_eq!(lc.state(), ChildProcessState::Running);
        assert_eq!(lc.pid(), Some(100));
        let input = &spawner.inputs()[0];
        assert_eq!(input.command, "./app");
        assert_eq!(input.args, vec!["--serve".to_string()]);
        assert_eq!(input.kill_signal, Signal::SIGINT);
        assert_eq!(input.kill_timeout, KILL_TIMEOUT);
        assert!(!input.setpgid);
        assert_eq!(input.env_value("FOO"), Some(&OsString::from("bar")));
        assert_eq!(input.env_value("BAZ"), Some(&OsString::from("qux")));
        // the supervisor's own environment is inherited
        if let Some(path) = std::env::var_os("PATH") {
            assert_eq!(input.env_value("PATH"), Some(&path));
        }
    }

    #[tokio::test]
    async fn rendered_values_override_inherited_ones() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("always", &spawner);

        lc.bounce(env(&[("PATH", "/rendered/bin")])).await.unwrap();
        assert_eq!(
            spawner.inputs()[0].env_value("PATH"),
            Some(&OsString::from("/rendered/bin"))
        );
    }

    #[tokio::test]
    async fn always_cancels_watcher_then_stops_then_starts() {
        let spawner = FakeSpawner::default();
        let (mut lc, mut rx) = lifecycle("always", &spawner);

        lc.bounce(env(&[("FOO", "1")])).await.unwrap();
        assert_eq!(
            lc.bounce(env(&[("FOO", "2")])).await.unwrap(),
            Bounced::Started { pid: 101, generation: 2 }
        );

        assert_eq!(
            spawner.ops(),
            vec![
                Op::Spawned { pid: 100 },
                // the watcher of pid 100 is gone before it is stopped
                Op::Stopped { pid: 100, watchers_left: 0 },
                Op::Spawned { pid: 101 },
            ]
        );
        assert_eq!(lc.state(), ChildProcessState::Running);
        assert_eq!(lc.generation(), 2);

        // the intentional stop never surfaces as an exit
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn never_keeps_running_process() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("never", &spawner);

        lc.bounce(env(&[("FOO", "1")])).await.unwrap();
        for i in 0..5 {
            lc.bounce(env(&[("FOO", i.to_string().as_str())])).await.unwrap();
        }

        assert_eq!(spawner.ops(), vec![Op::Spawned { pid: 100 }]);
        assert_eq!(lc.pid(), Some(100));
        assert_eq!(
            spawner.inputs()[0].env_value("FOO"),
            Some(&OsString::from("1"))
        );
    }

    #[tokio::test]
    async fn invalid_policy_starts_nothing() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("sometimes", &spawner);

        let err = lc.bounce(env(&[("FOO", "1")])).await.unwrap_err();
        assert!(matches!(
            err,
            BounceError::Config(ConfigError::InvalidRestartPolicy(ref p)) if p == "sometimes"
        ));
        assert!(spawner.ops().is_empty());
        assert_eq!(lc.state(), ChildProcessState::NotStarted);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let spawner = FakeSpawner::default();
        *spawner.fail.lock().unwrap() = true;
        let (mut lc, _rx) = lifecycle("always", &spawner);

        let err = lc.bounce(env(&[])).await.unwrap_err();
        assert_eq!(err.as_label(), "process_spawn");
        assert_eq!(lc.state(), ChildProcessState::NotStarted);
    }

    #[tokio::test]
    async fn unsolicited_exit_is_forwarded_once() {
        let spawner = FakeSpawner::default();
        let (mut lc, mut rx) = lifecycle("always", &spawner);

        lc.bounce(env(&[("FOO", "1")])).await.unwrap();
        spawner.exit(0, 3);

        let signal = rx.recv().await.unwrap();
        assert_eq!(signal, ExitSignal { generation: 1, code: 3 });
        assert_eq!(lc.accept_exit(signal), Some(3));
    }

    #[tokio::test]
    async fn exited_child_is_handed_back_instead_of_restarted() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("always", &spawner);

        lc.bounce(env(&[("FOO", "1")])).await.unwrap();
        spawner.exit(0, 3);

        let outcome = lc.bounce(env(&[("FOO", "2")])).await.unwrap();
        let exit = ExitSignal { generation: 1, code: 3 };
        assert_eq!(outcome, Bounced::AlreadyExited(exit));
        assert_eq!(spawner.ops(), vec![Op::Spawned { pid: 100 }]);
        assert_eq!(lc.state(), ChildProcessState::Running);
        assert_eq!(lc.accept_exit(exit), Some(3));
    }

    #[tokio::test]
    async fn exited_child_is_handed_back_under_never_too() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("never", &spawner);

        lc.bounce(env(&[("FOO", "1")])).await.unwrap();
        assert_eq!(lc.bounce(env(&[("FOO", "2")])).await.unwrap(), Bounced::Kept);

        spawner.exit(0, 0);
        assert_eq!(
            lc.bounce(env(&[("FOO", "3")])).await.unwrap(),
            Bounced::AlreadyExited(ExitSignal { generation: 1, code: 0 })
        );
    }

    #[tokio::test]
    async fn stale_exit_is_ignored() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("always", &spawner);

        lc.bounce(env(&[("FOO", "1")])).await.unwrap();
        lc.bounce(env(&[("FOO", "2")])).await.unwrap();
        assert_eq!(lc.accept_exit(ExitSignal { generation: 1, code: -1 }), None);
        assert_eq!(lc.accept_exit(ExitSignal { generation: 2, code: 0 }), Some(0));
    }

    #[tokio::test]
    async fn shutdown_stops_child_and_rejects_later_bounces() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("always", &spawner);

        lc.bounce(env(&[("FOO", "1")])).await.unwrap();
        lc.shutdown().await;
        assert_eq!(lc.state(), ChildProcessState::Stopped);
        assert_eq!(lc.pid(), None);

        let err = lc.bounce(env(&[("FOO", "2")])).await.unwrap_err();
        assert!(matches!(err, BounceError::State(_)));
        assert_eq!(spawner.ops().len(), 2);

        // idempotent
        lc.shutdown().await;
        assert_eq!(lc.state(), ChildProcessState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_before_first_start_stops_cleanly() {
        let spawner = FakeSpawner::default();
        let (mut lc, _rx) = lifecycle("always", &spawner);

        lc.shutdown().await;
        assert_eq!(lc.state(), ChildProcessState::Stopped);
        assert!(spawner.ops().is_empty());
    }

    #[tokio::test]
    async fn shell_string_runs_in_own_process_group() {
        let spawner = FakeSpawner::default();
        let exec = ExecConfig::new(["./app --serve 2>&1"]);
        let (mut lc, _rx) = Lifecycle::new(exec, Arc::new(spawner.clone()), Bus::new(4));

        lc.bounce(env(&[])).await.unwrap();
        let input = &spawner.inputs()[0];
        assert_eq!(input.command, "sh");
        assert!(input.setpgid);
    }
}
