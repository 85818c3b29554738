//! # Child-process state machine.
//!
//! ```text
//!               first bounce                 shutdown
//! NotStarted ───────────────► Running ───────────────────► Stopped
//!     │                        │   ▲                          ▲
//!     │ shutdown      "always" │   │ new process started      │
//!     │                        ▼   │                          │
//!     │                      Restarting ──────────────────────┤
//!     └───────────────────────────────────────────────────────┘
//! ```
//!
//! An unsolicited exit while `Running` ends supervision instead of moving to a state.
//! Any transition not drawn above is rejected with [`StateError`].

use crate::error::StateError;

/// Lifecycle of the supervised child process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChildProcessState {
    #[default]
    NotStarted,
    Running,
    Restarting,
    Stopped,
}

impl ChildProcessState {
    /// Returns `true` if `self → to` is in the transition table.
    pub fn can_transition(self, to: ChildProcessState) -> bool {
        use ChildProcessState::*;
        matches!(
            (self, to),
            (NotStarted, Running)
                | (NotStarted, Stopped)
                | (Running, Restarting)
                | (Running, Stopped)
                | (Restarting, Running)
                | (Restarting, Stopped)
        )
    }

    /// Performs a transition, rejecting anything outside the table.
    pub fn transition(&mut self, to: ChildProcessState) -> Result<(), StateError> {
        if !self.can_transition(to) {
            return Err(StateError { from: *self, to });
        }
        *self = to;
        Ok(())
    }

    #[inline]
    pub fn is_running(self) -> bool {
        self == ChildProcessState::Running
    }
}
