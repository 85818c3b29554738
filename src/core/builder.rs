use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::instrument::WithSubscriber;
use tracing::warn;

use super::{lifecycle::Lifecycle, supervisor::Supervisor};
use crate::{
    config::SupervisorConfig,
    engine::EngineFactory,
    events::Bus,
    logging,
    process::{OsSpawner, Spawner},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    factory: Arc<dyn EngineFactory>,
    spawner: Arc<dyn Spawner>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration and engine factory.
    pub fn new(cfg: SupervisorConfig, factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            cfg,
            factory,
            spawner: Arc::new(OsSpawner),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the process spawner (defaults to [`OsSpawner`]).
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (token rotations, engine restarts,
    /// process starts and exits) through dedicated workers with bounded queues.
    /// With the `logging` feature a [`LogWriter`](crate::LogWriter) is always
    /// added; its lines go to the configured log sink.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor.
    ///
    /// Must be called from within a tokio runtime: subscriber workers and the
    /// bus listener are spawned here, under the supervisor's log dispatcher.
    pub fn build(self) -> Supervisor {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let dispatch = logging::dispatch(&self.cfg.log_sink, self.cfg.log_level);

        #[allow(unused_mut)]
        let mut subscribers = self.subscribers;
        #[cfg(feature = "logging")]
        subscribers.push(Arc::new(crate::subscribers::LogWriter));
        let subs = tracing::dispatcher::with_default(&dispatch, || {
            let subs = Arc::new(SubscriberSet::new(subscribers));
            subscriber_listener(&bus, Arc::clone(&subs));
            subs
        });

        let exec = self.cfg.agent.exec.clone().unwrap_or_default();
        let (lifecycle, exit_rx) = Lifecycle::new(exec, self.spawner, bus.clone());

        Supervisor::new_internal(self.cfg, self.factory, bus, subs, dispatch, lifecycle, exit_rx)
    }
}

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
fn subscriber_listener(bus: &Bus, set: Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber listener lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    .with_current_subscriber());
}
