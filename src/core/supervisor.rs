//! # Supervisor: the control loop.
//!
//! The [`Supervisor`] is the single owner of the core state: the child
//! lifecycle, the latest token, the current rendering engine and its
//! configuration. Only [`Supervisor::run`] mutates it, one event at a time.
//!
//! ## High-level architecture
//! ```text
//! Inputs to run():
//!   CancellationToken ─┐
//!   token stream ──────┤
//!                      ▼
//!              Supervisor::run()
//!                      │
//! Startup:             ├─► nothing to supervise? → Ok(())
//!                      ├─► validate restart policy + command   (ConfigError → fatal)
//!                      ├─► RenderConfig::from_manager → EngineFactory::build(dry)
//!                      └─► engine.start(), RenderTracker(template_count)
//!
//! Loop (first ready wins, each handler runs to completion):
//!   cancelled        ──► stop engine → stop child → Stopped → Ok(())
//!   token            ──► duplicate? ignore
//!                        else stop engine → merge token → build → start
//!                             (build failure: log, keep waiting)
//!   engine error     ──► stop_immediately → exit_on_retry_failure? Err
//!                        else rebuild from same config (failure: Err)
//!   rendered         ──► RenderTracker::evaluate(all events)
//!                        Complete(env) & changed → Lifecycle::bounce(env)
//!   child exited     ──► Err(ProcessExited { code })
//!
//! Event flow:
//!   Supervisor / Lifecycle ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//! ```
//!
//! While no engine exists (a rotation failed to build one), the engine
//! branches are parked until the next token produces an engine.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//! use execvisor::{
//!     AgentConfig, ExecConfig, MemoryEngineFactory, Supervisor, SupervisorConfig, TemplateSpec,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = AgentConfig {
//!         env_templates: vec![TemplateSpec::inline("DB_PASSWORD", "{{ .password }}")],
//!         exec: Some(ExecConfig::new(["./server", "--port", "8080"])),
//!         ..AgentConfig::default()
//!     };
//!     let factory = MemoryEngineFactory::new();
//!     let mut sup = Supervisor::builder(SupervisorConfig::new(agent), Arc::new(factory.clone()))
//!         .build();
//!
//!     let cancel = CancellationToken::new();
//!     let stop = cancel.clone();
//!     tokio::spawn(async move {
//!         let _ = execvisor::wait_for_shutdown_signal().await;
//!         stop.cancel();
//!     });
//!
//!     let (tokens_tx, tokens_rx) = mpsc::channel(4);
//!     tokens_tx.send("s.initial".to_string()).await?;
//!     sup.run(cancel, tokens_rx).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug};

use super::builder::SupervisorBuilder;
use super::lifecycle::{Bounced, ExitSignal, Lifecycle};
use super::rotation::TokenRotation;
use super::state::ChildProcessState;
use crate::config::SupervisorConfig;
use crate::engine::{EngineFactory, EngineHandle, ManagerConfig, RenderConfig};
use crate::error::{EngineError, SupervisorError};
use crate::events::{Bus, Event, EventKind};
use crate::process::command_prep;
use crate::render::{EnvVar, RenderPass, RenderTracker};
use crate::subscribers::SubscriberSet;

/// One ready event source of the control loop.
enum Signal {
    Cancelled,
    Token(Option<String>),
    EngineFailed(EngineError),
    Rendered,
    Exited(ExitSignal),
}

/// Supervises one child process whose environment comes from rendered templates.
pub struct Supervisor {
    cfg: SupervisorConfig,
    factory: Arc<dyn EngineFactory>,
    bus: Bus,
    subscribers: Arc<SubscriberSet>,
    dispatch: Dispatch,
    lifecycle: Lifecycle,
    exit_rx: mpsc::Receiver<ExitSignal>,
    engine: Option<EngineHandle>,
    render_config: Arc<RenderConfig>,
    tracker: RenderTracker,
    rotation: TokenRotation,
    last_env: Option<Vec<EnvVar>>,
}

impl Supervisor {
    /// Starts building a supervisor around `factory`.
    pub fn builder(cfg: SupervisorConfig, factory: Arc<dyn EngineFactory>) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, factory)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        factory: Arc<dyn EngineFactory>,
        bus: Bus,
        subscribers: Arc<SubscriberSet>,
        dispatch: Dispatch,
        lifecycle: Lifecycle,
        exit_rx: mpsc::Receiver<ExitSignal>,
    ) -> Self {
        Self {
            cfg,
            factory,
            bus,
            subscribers,
            dispatch,
            lifecycle,
            exit_rx,
            engine: None,
            render_config: Arc::new(RenderConfig::default()),
            tracker: RenderTracker::new(0),
            rotation: TokenRotation::new(None),
            last_env: None,
        }
    }

    /// Event bus carrying every runtime event of this supervisor.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Current state of the child process.
    pub fn child_state(&self) -> ChildProcessState {
        self.lifecycle.state()
    }

    /// Pid of the running child, if any.
    pub fn child_pid(&self) -> Option<u32> {
        self.lifecycle.pid()
    }

    /// Events each subscriber dropped because its queue was full.
    pub fn dropped_events(&self) -> Vec<(&'static str, u64)> {
        self.subscribers.dropped()
    }

    /// Latest token: the configured one until a different token arrives.
    pub fn latest_token(&self) -> &str {
        self.rotation.latest()
    }

    /// Supervises until `cancel` fires (`Ok`) or a fatal condition occurs.
    ///
    /// `tokens` delivers the currently valid secret-store token; a repeated
    /// value is ignored, a new one rebuilds the rendering engine. When the
    /// stream closes, supervision continues without it.
    ///
    /// An unsolicited exit of the child ends supervision with
    /// [`SupervisorError::ProcessExited`]. On any other error the engine and
    /// the child are stopped before returning.
    ///
    /// Diagnostics are written to the configured log sink, whatever global
    /// `tracing` subscriber is installed.
    pub async fn run(
        &mut self,
        cancel: CancellationToken,
        tokens: mpsc::Receiver<String>,
    ) -> Result<(), SupervisorError> {
        let dispatch = self.dispatch.clone();
        self.supervise(cancel, tokens).with_subscriber(dispatch).await
    }

    async fn supervise(
        &mut self,
        cancel: CancellationToken,
        tokens: mpsc::Receiver<String>,
    ) -> Result<(), SupervisorError> {
        let templates = self.cfg.agent.env_templates.len();
        self.bus
            .publish(Event::new(EventKind::SupervisorStarting).with_count(templates));

        let res = self.run_inner(cancel, tokens).await;
        match &res {
            Ok(()) => {
                self.bus
                    .publish(Event::new(EventKind::SupervisorStopped).with_reason("shutdown"));
            }
            Err(err) => {
                if !matches!(err, SupervisorError::ProcessExited { .. }) {
                    self.abort().await;
                }
                debug!(label = err.as_label(), "supervision failed");
                self.bus.publish(
                    Event::new(EventKind::SupervisorStopped).with_reason(err.to_string()),
                );
            }
        }
        res
    }

    async fn run_inner(
        &mut self,
        cancel: CancellationToken,
        mut tokens: mpsc::Receiver<String>,
    ) -> Result<(), SupervisorError> {
        let Some(exec) = self.cfg.agent.exec.as_ref().filter(|_| !self.cfg.agent.is_idle()) else {
            self.bus.publish(Event::new(EventKind::NothingToSupervise));
            return Ok(());
        };
        exec.restart_policy()?;
        command_prep(&exec.command)?;

        let render_config = RenderConfig::from_manager(&ManagerConfig {
            agent: &self.cfg.agent,
            namespace: self.cfg.namespace.as_deref(),
            log_level: self.cfg.log_level,
            log_sink: self.cfg.log_sink.clone(),
        })?;
        self.rotation = TokenRotation::new(render_config.vault.token.as_deref());
        self.render_config = Arc::new(render_config);

        let handle = self
            .factory
            .build(Arc::clone(&self.render_config), true)
            .map_err(SupervisorError::EngineBuild)?;
        self.tracker = RenderTracker::new(handle.template_count());
        self.start_engine(handle);

        let mut tokens_open = true;
        loop {
            match self.next_signal(&cancel, &mut tokens, tokens_open).await {
                Signal::Cancelled => {
                    self.shutdown().await;
                    return Ok(());
                }
                Signal::Token(Some(token)) => self.on_token(token).await,
                Signal::Token(None) => {
                    debug!("token stream closed");
                    tokens_open = false;
                }
                Signal::EngineFailed(err) => self.on_engine_error(err).await?,
                Signal::Rendered => self.on_rendered().await?,
                Signal::Exited(signal) => self.on_exit(signal)?,
            }
        }
    }

    /// Waits for the first ready event source.
    async fn next_signal(
        &mut self,
        cancel: &CancellationToken,
        tokens: &mut mpsc::Receiver<String>,
        tokens_open: bool,
    ) -> Signal {
        let (errors, rendered) = match self.engine.as_mut() {
            Some(h) => (Some(&mut h.errors), Some(&mut h.rendered)),
            None => (None, None),
        };
        let exits = &mut self.exit_rx;

        tokio::select! {
            _ = cancel.cancelled() => Signal::Cancelled,
            token = tokens.recv(), if tokens_open => Signal::Token(token),
            Some(err) = recv_or_park(errors) => Signal::EngineFailed(err),
            Some(()) = recv_or_park(rendered) => Signal::Rendered,
            Some(signal) = exits.recv() => Signal::Exited(signal),
        }
    }

    async fn on_token(&mut self, token: String) {
        if !self.rotation.is_new(&token) {
            self.bus.publish(Event::new(EventKind::TokenIgnored));
            return;
        }

        self.bus.publish(Event::new(EventKind::TokenRotated));
        self.stop_engine("rotation").await;

        let next = Arc::new(self.rotation.rotate(token, &self.render_config));
        self.render_config = Arc::clone(&next);
        match self.factory.build(next, true) {
            Ok(handle) => self.start_engine(handle),
            Err(err) => {
                self.bus.publish(
                    Event::new(EventKind::EngineBuildFailed).with_reason(err.to_string()),
                );
            }
        }
    }

    async fn on_engine_error(&mut self, err: EngineError) -> Result<(), SupervisorError> {
        self.bus
            .publish(Event::new(EventKind::EngineFailed).with_reason(err.to_string()));

        if let Some(mut handle) = self.engine.take() {
            handle.stop_immediately().await;
            self.bus
                .publish(Event::new(EventKind::EngineStopped).with_reason("error"));
        }
        if self.cfg.exit_on_retry_failure() {
            return Err(SupervisorError::Engine(err));
        }

        debug!("rebuilding template server");
        let handle = self
            .factory
            .build(Arc::clone(&self.render_config), true)
            .map_err(SupervisorError::EngineBuild)?;
        self.start_engine(handle);
        Ok(())
    }

    async fn on_rendered(&mut self) -> Result<(), SupervisorError> {
        let Some(handle) = self.engine.as_ref() else {
            return Ok(());
        };
        let events = handle.render_events();

        match self.tracker.evaluate(&events) {
            RenderPass::Incomplete { seen, expected } => {
                self.bus.publish(
                    Event::new(EventKind::RenderIncomplete)
                        .with_count(seen)
                        .with_reason(format!("{seen} of {expected} templates reported")),
                );
            }
            RenderPass::Pending { template_id } => {
                self.bus.publish(
                    Event::new(EventKind::RenderIncomplete)
                        .with_count(events.len())
                        .with_reason(format!("waiting for {template_id}")),
                );
            }
            RenderPass::Complete(env) => {
                if self.last_env.as_ref() == Some(&env) {
                    debug!("rendered environment unchanged");
                    return Ok(());
                }
                self.bus
                    .publish(Event::new(EventKind::RenderComplete).with_count(env.len()));
                self.last_env = Some(env.clone());
                if let Bounced::AlreadyExited(exit) = self.lifecycle.bounce(env).await? {
                    return self.on_exit(exit);
                }
            }
        }
        Ok(())
    }

    fn on_exit(&mut self, signal: ExitSignal) -> Result<(), SupervisorError> {
        let Some(code) = self.lifecycle.accept_exit(signal) else {
            return Ok(());
        };
        self.bus.publish(
            Event::new(EventKind::ProcessExited)
                .with_exit_code(code)
                .with_generation(signal.generation),
        );
        Err(SupervisorError::ProcessExited { code })
    }

    fn start_engine(&mut self, mut handle: EngineHandle) {
        handle.start();
        self.bus.publish(
            Event::new(EventKind::EngineStarted).with_count(handle.template_count()),
        );
        self.engine = Some(handle);
    }

    async fn stop_engine(&mut self, reason: &'static str) {
        if let Some(mut handle) = self.engine.take() {
            handle.stop().await;
            self.bus
                .publish(Event::new(EventKind::EngineStopped).with_reason(reason));
        }
    }

    /// Orderly stop: engine first, then the child.
    async fn shutdown(&mut self) {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.stop_engine("shutdown").await;
        self.lifecycle.shutdown().await;
    }

    /// Cleanup after a fatal error.
    async fn abort(&mut self) {
        if let Some(mut handle) = self.engine.take() {
            handle.stop_immediately().await;
            self.bus
                .publish(Event::new(EventKind::EngineStopped).with_reason("error"));
        }
        self.lifecycle.shutdown().await;
    }
}

/// Receives from `rx`, or never completes when there is no receiver.
async fn recv_or_park<T>(rx: Option<&mut mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
