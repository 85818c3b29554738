//! # SubscriberSet: fan-out of supervisor events
//!
//! Every subscriber owns a bounded queue and a worker task. [`SubscriberSet::emit`]
//! only enqueues, so a slow log sink or exporter can never stall the control
//! loop while it is bouncing the child.
//!
//! ```text
//!    emit(&Event)  (one Arc<Event> shared by all queues)
//!        ├──► [queue LogWriter] ─► worker ─► on_event()
//!        ├──► [queue S2]        ─► worker ─► on_event()
//!        └──► [queue SN]        ─► worker ─► on_event()
//! ```
//!
//! - Order is FIFO per subscriber; there is no ordering across subscribers
//!   (use [`Event::seq`]).
//! - A full or closed queue drops the event for that subscriber and bumps its
//!   drop counter ([`SubscriberSet::dropped`]).
//! - A panic inside `on_event` is caught and logged; the worker keeps going.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::instrument::WithSubscriber;
use tracing::{error, warn};

use crate::events::Event;

use super::Subscribe;

/// Queue end and bookkeeping of one subscriber.
struct Worker {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(sub: Arc<dyn Subscribe>) -> Self {
        let name = sub.name();
        let (queue, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));

        let handle = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                let delivery = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
                if let Err(panic) = delivery.await {
                    error!(subscriber = name, seq = ev.seq, panic = ?panic, "subscriber panicked");
                }
            }
        }
        .with_current_subscriber());

        Self {
            name,
            queue,
            dropped: AtomicU64::new(0),
            handle,
        }
    }

    fn offer(&self, ev: &Arc<Event>) {
        let cause = match self.queue.try_send(Arc::clone(ev)) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(_)) => "queue full",
            Err(mpsc::error::TrySendError::Closed(_)) => "worker closed",
        };
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(subscriber = self.name, seq = ev.seq, dropped, "event dropped: {cause}");
    }
}

/// Subscribers of one supervisor, each behind its own bounded queue.
pub struct SubscriberSet {
    workers: Vec<Worker>,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker per subscriber.
    ///
    /// Must be called from within a tokio runtime. Workers log through the
    /// dispatcher that is current at this call.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        Self {
            workers: subs.into_iter().map(Worker::spawn).collect(),
        }
    }

    /// Enqueues `event` for every subscriber without waiting.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for worker in &self.workers {
            worker.offer(&ev);
        }
    }

    /// Events dropped so far, per subscriber name.
    pub fn dropped(&self) -> Vec<(&'static str, u64)> {
        self.workers
            .iter()
            .map(|w| (w.name, w.dropped.load(Ordering::Relaxed)))
            .collect()
    }

    /// Closes every queue and waits until the workers delivered what was queued.
    pub async fn shutdown(self) {
        let mut handles = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            drop(worker.queue);
            handles.push(worker.handle);
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::events::EventKind;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber bug");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    /// Never drains its single-slot queue while the gate is closed.
    struct Stuck(tokio::sync::Notify);

    #[async_trait]
    impl Subscribe for Stuck {
        async fn on_event(&self, _ev: &Event) {
            self.0.notified().await;
        }

        fn name(&self) -> &'static str {
            "stuck"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_survives_panics() {
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![Arc::new(Panicky), collect.clone()]);

        set.emit(&Event::new(EventKind::EngineStarted));
        set.emit(&Event::new(EventKind::RenderComplete));
        set.shutdown().await;

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec![EventKind::EngineStarted, EventKind::RenderComplete]
        );
    }

    #[tokio::test]
    async fn full_queue_counts_drops_for_that_subscriber_only() {
        let stuck = Arc::new(Stuck(tokio::sync::Notify::new()));
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![stuck.clone(), collect.clone()]);

        // workers have not run yet: the single slot holds the first event
        set.emit(&Event::new(EventKind::ProcessStarted));
        set.emit(&Event::new(EventKind::ProcessStopping));
        set.emit(&Event::new(EventKind::ProcessStarted));

        assert_eq!(set.dropped(), vec![("stuck", 2), (std::any::type_name::<Collect>(), 0)]);

        stuck.0.notify_one();
        set.shutdown().await;
        assert_eq!(collect.0.lock().unwrap().len(), 3);
    }
}
