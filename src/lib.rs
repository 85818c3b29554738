//! # execvisor
//!
//! **Execvisor** supervises a single child process whose environment variables
//! are rendered from secret templates.
//!
//! A rendering engine (an external collaborator behind [`EngineFactory`])
//! watches remote secrets and renders one or more templates. Once **every**
//! template has produced output, the rendered values are exposed to the child
//! as `NAME=value` assignments and the child is started, or restarted
//! according to its [`RestartPolicy`]. A stream of secret-store tokens can
//! rotate the engine's credential while supervision runs.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   CancellationToken     token stream (String)
//!          │                     │
//!          ▼                     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor::run (control loop, single writer)                    │
//! │  - TokenRotation  (latest token, RenderConfig::merge)             │
//! │  - EngineHandle   (current engine + error/rendered streams)       │
//! │  - RenderTracker  (is the pass complete?)                         │
//! │  - Lifecycle      (restart policy, the one child process)         │
//! └──────┬──────────────────────────┬───────────────────────┬─────────┘
//!        │ build/start/stop         │ bounce(env)           │
//!        ▼                          ▼                       │
//! ┌──────────────┐          ┌──────────────┐                │
//! │ RenderEngine │          │   Spawner    │                │
//! │ (dry mode)   │          │ ChildProcess │──► exit watcher│
//! └──────────────┘          └──────────────┘   (per child)  │
//!                                                           ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │              (capacity: SupervisorConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                          ┌────────┼─────────┐
//!                          ▼        ▼         ▼
//!                      LogWriter  sub2.on   subN.on
//!                                  _event()  _event()
//! ```
//!
//! ### Child lifecycle
//! ```text
//! rendered notification
//!   ├─► events.len() < templates           ─► wait
//!   ├─► a template never rendered          ─► wait
//!   ├─► same environment as last time      ─► nothing
//!   └─► complete ─► bounce(env)
//!         ├─ not running        ─► start                       (NotStarted → Running)
//!         ├─ running, "always"  ─► cancel watcher, stop, start (Running → Restarting → Running)
//!         └─ running, "never"   ─► keep the running process
//!
//! child exits on its own ─► run() returns SupervisorError::ProcessExited { code }
//! cancellation           ─► stop engine, stop child          (→ Stopped), run() returns Ok
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Control loop over tokens, renders and child exits.           | [`Supervisor`], [`SupervisorBuilder`]       |
//! | **Rendering**     | Engine seam and completeness detection.                      | [`EngineFactory`], [`RenderTracker`]        |
//! | **Processes**     | Spawning, graceful stop with kill timeout.                   | [`Spawner`], [`ChildProcess`], [`OsSpawner`]|
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom).         | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors; child exit carries its code.                   | [`SupervisorError`], [`ConfigError`]        |
//! | **Configuration** | Agent, exec and template settings (serde).                   | [`SupervisorConfig`], [`AgentConfig`]       |
//!
//! ## Logging
//! Everything the supervisor logs goes through `tracing` into
//! [`SupervisorConfig::log_sink`], capped at [`SupervisorConfig::log_level`].
//! This holds for the tasks it spawns too, independent of any global subscriber.
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] and attaches it to
//!   every supervisor, so each event becomes one log line.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//! use execvisor::{AgentConfig, MemoryEngineFactory, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Without templates there is nothing to supervise: run() returns at once.
//!     let cfg = SupervisorConfig::new(AgentConfig::default());
//!     let mut sup = Supervisor::builder(cfg, Arc::new(MemoryEngineFactory::new())).build();
//!
//!     let (_tokens_tx, tokens_rx) = mpsc::channel::<String>(1);
//!     sup.run(CancellationToken::new(), tokens_rx).await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod engine;
mod error;
mod events;
mod logging;
mod os_signals;
mod policies;
mod process;
mod render;
mod subscribers;

// ---- Public re-exports ----

pub use config::{
    AgentConfig, ExecConfig, LogLevel, LogSink, SupervisorConfig, TemplateConfig, TemplateSpec,
    VaultConfig, parse_signal,
};
pub use core::{ChildProcessState, ExitSignal, Supervisor, SupervisorBuilder};
pub use engine::{
    CLIENT_USER_AGENT, EngineFactory, EngineHandle, EngineNotifier, EngineOp, EngineReceivers,
    ManagerConfig, MemoryEngine, MemoryEngineFactory, RenderConfig, RenderEngine, VaultSettings,
    notifier,
};
pub use error::{
    BounceError, ConfigError, EngineError, ProcessError, StateError, SupervisorError,
};
pub use events::{Bus, Event, EventKind};
pub use os_signals::wait_for_shutdown_signal;
pub use policies::RestartPolicy;
pub use process::{
    ChildProcess, KILL_TIMEOUT, OsSpawner, PreparedCommand, SpawnInput, Spawner, command_prep,
};
pub use render::{EnvVar, RenderEvent, RenderPass, RenderTracker};
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in logger subscriber.
// Enabled by default; disable with `--no-default-features`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
