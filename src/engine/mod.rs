//! # Rendering-engine seam.
//!
//! The templating engine (template parsing, watching remote secrets, computing
//! renders) is an external collaborator. The supervisor only needs:
//!
//! - [`EngineFactory::build`] to create an engine from a [`RenderConfig`] (always in dry mode:
//!   nothing is written to disk, output is consumed from render events),
//! - [`RenderEngine`] to start/stop it and read the current render events,
//! - two notification streams carried by [`EngineHandle`]: runtime errors and
//!   "a template was rendered".
//!
//! ```text
//! EngineFactory::build(Arc<RenderConfig>, dry) ─► EngineHandle
//!                                                   ├─ engine: Box<dyn RenderEngine>
//!                                                   ├─ errors:   mpsc::Receiver<EngineError>
//!                                                   └─ rendered: mpsc::Receiver<()>   (coalesced)
//! ```
//!
//! Engine implementations create their channels with [`notifier`].

mod config;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::render::RenderEvent;

pub use config::{CLIENT_USER_AGENT, ManagerConfig, RenderConfig, VaultSettings};
pub use memory::{EngineOp, MemoryEngine, MemoryEngineFactory};

/// Capacity of the error stream. Errors beyond it are dropped until the supervisor reads.
const ERROR_CAPACITY: usize = 8;

/// A running (or runnable) rendering engine instance.
#[async_trait]
pub trait RenderEngine: Send + 'static {
    /// Number of distinct templates this engine renders.
    fn template_count(&self) -> usize;

    /// Starts the engine's internal work; returns immediately.
    fn start(&mut self);

    /// Stops the engine, letting in-flight work finish.
    async fn stop(&mut self);

    /// Stops the engine without draining in-flight work.
    async fn stop_immediately(&mut self);

    /// Complete current set of render events (one per template that reported).
    fn render_events(&self) -> Vec<RenderEvent>;
}

/// Creates rendering engines.
pub trait EngineFactory: Send + Sync + 'static {
    fn build(&self, config: Arc<RenderConfig>, dry: bool) -> Result<EngineHandle, EngineError>;
}

/// Sending half handed to an engine implementation.
#[derive(Clone, Debug)]
pub struct EngineNotifier {
    errors: mpsc::Sender<EngineError>,
    rendered: mpsc::Sender<()>,
}

impl EngineNotifier {
    /// Signals that a template was rendered. Repeated signals coalesce until read.
    pub fn rendered(&self) {
        let _ = self.rendered.try_send(());
    }

    /// Reports a runtime error.
    pub fn error(&self, err: EngineError) {
        let _ = self.errors.try_send(err);
    }
}

/// Receiving half owned by the [`EngineHandle`].
#[derive(Debug)]
pub struct EngineReceivers {
    errors: mpsc::Receiver<EngineError>,
    rendered: mpsc::Receiver<()>,
}

/// Creates a connected notifier/receivers pair.
pub fn notifier() -> (EngineNotifier, EngineReceivers) {
    let (err_tx, err_rx) = mpsc::channel(ERROR_CAPACITY);
    let (rendered_tx, rendered_rx) = mpsc::channel(1);
    (
        EngineNotifier {
            errors: err_tx,
            rendered: rendered_tx,
        },
        EngineReceivers {
            errors: err_rx,
            rendered: rendered_rx,
        },
    )
}

/// An engine together with its notification streams.
///
/// Exactly one handle is current inside the supervisor at a time.
pub struct EngineHandle {
    engine: Box<dyn RenderEngine>,
    pub(crate) errors: mpsc::Receiver<EngineError>,
    pub(crate) rendered: mpsc::Receiver<()>,
}

impl EngineHandle {
    pub fn new(engine: Box<dyn RenderEngine>, receivers: EngineReceivers) -> Self {
        Self {
            engine,
            errors: receivers.errors,
            rendered: receivers.rendered,
        }
    }

    pub fn template_count(&self) -> usize {
        self.engine.template_count()
    }

    pub fn start(&mut self) {
        self.engine.start();
    }

    pub async fn stop(&mut self) {
        self.engine.stop().await;
    }

    pub async fn stop_immediately(&mut self) {
        self.engine.stop_immediately().await;
    }

    pub fn render_events(&self) -> Vec<RenderEvent> {
        self.engine.render_events()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("templates", &self.engine.template_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rendered_notifications_coalesce() {
        let (tx, mut rx) = notifier();
        tx.rendered();
        tx.rendered();
        tx.rendered();

        assert_eq!(rx.rendered.recv().await, Some(()));
        assert!(rx.rendered.try_recv().is_err());
    }

    #[tokio::test]
    async fn errors_are_delivered_in_order() {
        let (tx, mut rx) = notifier();
        tx.error(EngineError::Render("first".into()));
        tx.error(EngineError::Render("second".into()));

        assert_eq!(rx.errors.recv().await, Some(EngineError::Render("first".into())));
        assert_eq!(rx.errors.recv().await, Some(EngineError::Render("second".into())));
    }
}
