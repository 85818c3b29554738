//! # Event subscribers for the execvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`] (feature `logging`).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Supervisor/Lifecycle ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                          │
//!                                                    SubscriberSet::emit
//!                                                 ┌────────┼─────────┐
//!                                                 ▼        ▼         ▼
//!                                             LogWriter  Metrics   Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
