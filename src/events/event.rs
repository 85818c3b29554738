//! # Runtime events emitted by the supervisor.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Supervisor events**: start, shutdown, stop
//! - **Token events**: rotation and duplicate suppression
//! - **Engine events**: rendering engine lifecycle and render passes
//! - **Process events**: child process lifecycle
//!
//! The [`Event`] struct carries additional metadata such as timestamps, pid,
//! exit code, reasons and counts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use execvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ProcessStarted)
//!     .with_pid(4242)
//!     .with_count(3);
//!
//! assert_eq!(ev.kind, EventKind::ProcessStarted);
//! assert_eq!(ev.pid, Some(4242));
//! assert_eq!(ev.count, Some(3));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Supervisor events ===
    /// Supervision is starting.
    ///
    /// Sets:
    /// - `count`: number of configured env templates
    SupervisorStarting,

    /// No templates or no exec section; nothing to supervise.
    NothingToSupervise,

    /// Cancellation observed; engine and child are being stopped.
    ShutdownRequested,

    /// Supervision ended.
    ///
    /// Sets:
    /// - `reason`: why (`shutdown`, or the terminating error)
    SupervisorStopped,

    // === Token events ===
    /// A new token arrived and the engine is being rebuilt with it.
    TokenRotated,

    /// The token equals the latest one; nothing to do.
    TokenIgnored,

    // === Engine events ===
    /// A rendering engine was built and started.
    ///
    /// Sets:
    /// - `count`: template count of the engine
    EngineStarted,

    /// The rendering engine was stopped.
    ///
    /// Sets:
    /// - `reason`: `rotation`, `error` or `shutdown`
    EngineStopped,

    /// The rendering engine reported a runtime error.
    ///
    /// Sets:
    /// - `reason`: engine error
    EngineFailed,

    /// Building a rendering engine failed.
    ///
    /// Sets:
    /// - `reason`: build error
    EngineBuildFailed,

    /// A render notification arrived but the pass is not finished.
    ///
    /// Sets:
    /// - `count`: events seen
    /// - `reason`: what is missing
    RenderIncomplete,

    /// Every template rendered; the child will be bounced.
    ///
    /// Sets:
    /// - `count`: number of environment assignments
    RenderComplete,

    // === Process events ===
    /// A child process was started.
    ///
    /// Sets:
    /// - `pid`: process id
    /// - `count`: number of rendered environment assignments
    /// - `generation`: process instance number (1-based)
    ProcessStarted,

    /// A running child is being stopped (restart or shutdown).
    ///
    /// Sets:
    /// - `pid`: process id
    /// - `reason`: `restart` or `shutdown`
    ProcessStopping,

    /// Secrets changed but the restart policy keeps the running child.
    ///
    /// Sets:
    /// - `pid`: process id
    ProcessRestartSkipped,

    /// The child exited on its own.
    ///
    /// Sets:
    /// - `exit_code`: OS exit code
    /// - `generation`: process instance number
    ProcessExited,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Child process id, if applicable.
    pub pid: Option<u32>,
    /// Child exit code, if applicable.
    pub exit_code: Option<i32>,
    /// Process instance number, if applicable.
    pub generation: Option<u64>,
    /// A count whose meaning depends on the kind.
    pub count: Option<usize>,
    /// Human-readable reason (errors, stop causes, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pid: None,
            exit_code: None,
            generation: None,
            count: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a child pid.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a child exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches a process instance number.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches a count.
    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    #[inline]
    pub fn is_process_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ProcessStarted
                | EventKind::ProcessStopping
                | EventKind::ProcessRestartSkipped
                | EventKind::ProcessExited
        )
    }
}
