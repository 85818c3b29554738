//! Restart policy.
//!
//! This module groups the knob that controls **if** a running child is
//! restarted when its rendered environment changes.
//!
//! ## Contents
//! - [`RestartPolicy`] what to do with a running child (always / never)
//!
//! ## Quick wiring
//! ```text
//! ExecConfig { restart_on_secret_changes: String }
//!      └─► ExecConfig::restart_policy() ─► RestartPolicy
//!           └─► core::lifecycle::Lifecycle::bounce decides stop/keep
//! ```

mod restart;

pub use restart::RestartPolicy;
