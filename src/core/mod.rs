//! Runtime core: the control loop and the child lifecycle.
//!
//! The public entry point is [`Supervisor`] (constructed with
//! [`SupervisorBuilder`]), which multiplexes cancellation, tokens, engine
//! notifications and child exits.
//!
//! Internal modules:
//! - [`supervisor`]: the control loop; single owner of all core state;
//! - [`lifecycle`]: restart policy, process start/stop and exit watchers;
//! - [`rotation`]: latest-token tracking and config merging on rotation;
//! - [`state`]: child-process state machine;
//! - [`builder`]: wiring of bus, subscribers and spawner.

mod builder;
mod lifecycle;
mod rotation;
mod state;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use lifecycle::ExitSignal;
pub use state::ChildProcessState;
pub use supervisor::Supervisor;
