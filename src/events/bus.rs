//! # Bus: broadcast of supervisor events.
//!
//! The control loop and the child lifecycle publish every state change here
//! (engine started, render incomplete, token rotated, process started, and so
//! on). `SupervisorBuilder::build` attaches one listener that feeds the
//! [`SubscriberSet`](crate::SubscriberSet); embedders and tests may call
//! [`Bus::subscribe`] for a receiver of their own.
//!
//! ```text
//!   Supervisor loop ──┐                 ┌──► listener ──► SubscriberSet
//!                     ├──► Bus (ring) ──┤
//!   Lifecycle       ──┘                 └──► Bus::subscribe()
//! ```
//!
//! Publishing never waits. The ring holds the last `bus_capacity` events for
//! all receivers; a receiver that falls behind gets `RecvError::Lagged(n)` and
//! resumes after the `n` events it missed. Events published while nobody is
//! subscribed are gone.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable publishing handle shared by the supervisor and the lifecycle.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding up to `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, ev: Event) {
        // no receivers is not an error
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::RecvError;

    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn subscribers_see_events_published_after_subscribing() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::TokenIgnored));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TokenRotated));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::TokenRotated);
    }

    #[tokio::test]
    async fn lagging_receiver_skips_oldest_events() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ProcessStarted));
        bus.publish(Event::new(EventKind::ProcessStopping));
        bus.publish(Event::new(EventKind::ProcessStarted));

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ProcessStopping);
    }
}
