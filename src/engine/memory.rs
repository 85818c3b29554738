//! # In-process rendering engine.
//!
//! [`MemoryEngineFactory`] builds [`MemoryEngine`]s whose "rendered secrets" are
//! pushed by the caller instead of fetched from a secret store. The render state
//! lives in the factory (it plays the secret store), so a freshly built engine
//! re-renders the current secrets when it starts, like a real engine would.
//!
//! The factory records everything it is asked to do ([`EngineOp`]), which makes
//! engine lifetimes observable from tests.
//!
//! ```text
//! factory.render("FOO", "bar") ──► state.events[template of FOO] = rendered(now)
//!                                  └─► current engine running? ─► notifier.rendered()
//! factory.fail("boom")          ──► current engine running? ─► notifier.error(Render("boom"))
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use async_trait::async_trait;

use super::{EngineFactory, EngineHandle, EngineNotifier, RenderConfig, RenderEngine, notifier};
use crate::error::EngineError;
use crate::render::RenderEvent;

/// Operations observed by the factory, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineOp {
    Built { id: u64, dry: bool },
    BuildFailed { error: String },
    Started { id: u64 },
    Stopped { id: u64 },
    StoppedImmediately { id: u64 },
}

#[derive(Default)]
struct FactoryState {
    next_id: u64,
    configs: Vec<Arc<RenderConfig>>,
    ops: Vec<EngineOp>,
    fail_next: Option<String>,
    /// Last rendered value per template id.
    events: HashMap<String, RenderEvent>,
    /// Engine currently receiving notifications.
    current: Option<(u64, EngineNotifier)>,
}

/// Builds [`MemoryEngine`]s and drives their renders.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryEngineFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MemoryEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FactoryState> {
        // a poisoned lock only means a test panicked mid-update; keep going
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next [`EngineFactory::build`] fail with `reason`.
    pub fn fail_next_build(&self, reason: impl Into<String>) {
        self.lock().fail_next = Some(reason.into());
    }

    /// Renders `contents` for the template mapped to `env_var`.
    ///
    /// Returns `false` when no template of the latest build maps `env_var`.
    pub fn render(&self, env_var: &str, contents: impl Into<Vec<u8>>) -> bool {
        self.update(env_var, |id, vars| {
            RenderEvent::rendered(id, vars, contents, SystemTime::now())
        })
    }

    /// Records an event for the template mapped to `env_var` that has not produced output yet.
    pub fn mark_pending(&self, env_var: &str) -> bool {
        self.update(env_var, |id, vars| RenderEvent::pending(id, vars))
    }

    fn update<F>(&self, env_var: &str, make: F) -> bool
    where
        F: FnOnce(String, Vec<String>) -> RenderEvent,
    {
        let mut st = self.lock();
        let Some(config) = st.configs.last().cloned() else {
            return false;
        };
        let Some((id, vars)) = layout(&config)
            .into_iter()
            .find(|(_, vars)| vars.iter().any(|v| v == env_var))
        else {
            return false;
        };
        st.events.insert(id.clone(), make(id, vars));
        if let Some((_, notifier)) = &st.current {
            notifier.rendered();
        }
        true
    }

    /// Reports a runtime error on the current engine, if one is running.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let st = self.lock();
        match &st.current {
            Some((_, notifier)) => {
                notifier.error(EngineError::Render(reason.into()));
                true
            }
            None => false,
        }
    }

    /// Every operation so far, in order.
    pub fn ops(&self) -> Vec<EngineOp> {
        self.lock().ops.clone()
    }

    /// Configurations of every successful build, in order.
    pub fn configs(&self) -> Vec<Arc<RenderConfig>> {
        self.lock().configs.clone()
    }

    /// Number of successful builds.
    pub fn builds(&self) -> usize {
        self.lock().configs.len()
    }

    /// Number of stops (graceful or immediate).
    pub fn stops(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, EngineOp::Stopped { .. } | EngineOp::StoppedImmediately { .. }))
            .count()
    }

    /// Id of the engine currently running, if any.
    pub fn running(&self) -> Option<u64> {
        self.lock().current.as_ref().map(|(id, _)| *id)
    }
}

impl EngineFactory for MemoryEngineFactory {
    fn build(&self, config: Arc<RenderConfig>, dry: bool) -> Result<EngineHandle, EngineError> {
        let mut st = self.lock();
        if let Some(reason) = st.fail_next.take() {
            st.ops.push(EngineOp::BuildFailed {
                error: reason.clone(),
            });
            return Err(EngineError::Build(reason));
        }

        st.next_id += 1;
        let id = st.next_id;
        st.configs.push(Arc::clone(&config));
        st.ops.push(EngineOp::Built { id, dry });

        let (notifier, receivers) = notifier();
        let engine = MemoryEngine {
            id,
            layout: layout(&config),
            factory: self.clone(),
            notifier,
            running: false,
        };
        Ok(EngineHandle::new(Box::new(engine), receivers))
    }
}

/// Template ids in configuration order, each with the env vars it feeds.
fn layout(config: &RenderConfig) -> Vec<(String, Vec<String>)> {
    let mut out: Vec<(String, Vec<String>)> = Vec::new();
    for tpl in &config.templates {
        let id = tpl.template_id();
        match out.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, vars)) => vars.push(tpl.env_var.clone()),
            None => out.push((id, vec![tpl.env_var.clone()])),
        }
    }
    out
}

/// Engine built by [`MemoryEngineFactory`].
pub struct MemoryEngine {
    id: u64,
    layout: Vec<(String, Vec<String>)>,
    factory: MemoryEngineFactory,
    notifier: EngineNotifier,
    running: bool,
}

impl MemoryEngine {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn halt(&mut self, op: EngineOp) {
        let mut st = self.factory.lock();
        if st.current.as_ref().is_some_and(|(id, _)| *id == self.id) {
            st.current = None;
        }
        st.ops.push(op);
        self.running = false;
    }
}

#[async_trait]
impl RenderEngine for MemoryEngine {
    fn template_count(&self) -> usize {
        self.layout.len()
    }

    fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        let mut st = self.factory.lock();
        st.current = Some((self.id, self.notifier.clone()));
        st.ops.push(EngineOp::Started { id: self.id });
        if self.layout.iter().any(|(id, _)| st.events.contains_key(id)) {
            self.notifier.rendered();
        }
    }

    async fn stop(&mut self) {
        self.halt(EngineOp::Stopped { id: self.id });
    }

    async fn stop_immediately(&mut self) {
        self.halt(EngineOp::StoppedImmediately { id: self.id });
    }

    fn render_events(&self) -> Vec<RenderEvent> {
        let st = self.factory.lock();
        self.layout
            .iter()
            .filter_map(|(id, vars)| {
                st.events.get(id).map(|ev| RenderEvent {
                    env_vars: vars.clone(),
                    ..ev.clone()
                })
            })
            .collect()
    }
}
