//! # Subscribe: consumers of supervisor events.
//!
//! A subscriber sees every [`Event`] the supervisor and the child lifecycle
//! publish: engine builds and stops, render progress, token rotations and
//! process starts, stops and exits. The built-in one is `LogWriter`; exporters
//! and audit trails plug in through [`SupervisorBuilder::with_subscribers`].
//!
//! [`SupervisorBuilder::with_subscribers`]: crate::SupervisorBuilder::with_subscribers
//!
//! ```rust
//! use async_trait::async_trait;
//! use execvisor::{Event, EventKind, Subscribe};
//!
//! struct Restarts;
//!
//! #[async_trait]
//! impl Subscribe for Restarts {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::ProcessStopping) {
//!             // count a restart
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "restarts" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives supervisor events on its own worker task.
///
/// Events arrive one at a time, in publish order. A handler that blocks only
/// delays its own queue; once the queue is full further events are dropped
/// for this subscriber and counted in `SubscriberSet::dropped`.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name used in drop counts and in log fields. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue length for this subscriber; 0 is treated as 1.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
