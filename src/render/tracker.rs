//! # Render-completeness tracking.
//!
//! The rendering engine notifies after **every** template render, and always
//! exposes the complete current set of events (not a delta). [`RenderTracker`]
//! turns that set into a decision:
//!
//! ```text
//! events.len() < expected            → Incomplete   (wait for more templates)
//! any event never rendered           → Pending      (a template has no output yet)
//! otherwise                          → Complete(env) (NAME=value for every mapping)
//! ```
//!
//! ## Rules
//! - The decision depends only on the current set, never on arrival order.
//! - Assignment order follows event order, then mapping order inside an event.
//! - Duplicate names across templates are kept; the last one wins when the
//!   environment is applied.
//! - Runs on every notification: a steady stream of secret changes yields a
//!   steady stream of `Complete` decisions.

use super::event::{EnvVar, RenderEvent};

/// Outcome of evaluating one batch of render events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderPass {
    /// Fewer events than configured templates.
    Incomplete { seen: usize, expected: usize },
    /// A template has an event but never produced output.
    Pending { template_id: String },
    /// Every template rendered; the collected environment.
    Complete(Vec<EnvVar>),
}

impl RenderPass {
    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self, RenderPass::Complete(_))
    }
}

/// Decides whether a full rendering pass has finished.
///
/// `expected` is the template count captured when supervision starts; it never changes.
#[derive(Clone, Copy, Debug)]
pub struct RenderTracker {
    expected: usize,
}

impl RenderTracker {
    pub fn new(expected: usize) -> Self {
        Self { expected }
    }

    /// Evaluates the complete current set of events.
    pub fn evaluate(&self, events: &[RenderEvent]) -> RenderPass {
        if events.len() < self.expected {
            return RenderPass::Incomplete {
                seen: events.len(),
                expected: self.expected,
            };
        }

        let mut env = Vec::new();
        for event in events {
            if !event.has_rendered() {
                return RenderPass::Pending {
                    template_id: event.template_id.clone(),
                };
            }
            env.extend(event.assignments());
        }
        RenderPass::Complete(env)
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn rendered(id: &str, vars: &[&str], contents: &str) -> RenderEvent {
        RenderEvent::rendered(
            id,
            vars.iter().map(|v| v.to_string()).collect(),
            contents,
            SystemTime::now(),
        )
    }

    fn names(pass: &RenderPass) -> Vec<String> {
        match pass {
            RenderPass::Complete(env) => env.iter().map(|e| e.to_string()).collect(),
            other => panic!("expected complete pass, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_until_every_template_reported() {
        let tracker = RenderTracker::new(2);
        let pass = tracker.evaluate(&[rendered("a", &["FOO"], "bar")]);
        assert_eq!(pass, RenderPass::Incomplete { seen: 1, expected: 2 });
        assert!(!pass.is_complete());
        assert_eq!(tracker.evaluate(&[]), RenderPass::Incomplete { seen: 0, expected: 2 });
    }

    #[test]
    fn pending_when_any_template_never_rendered() {
        let tracker = RenderTracker::new(2);
        let events = [
            rendered("a", &["FOO"], "bar"),
            RenderEvent::pending("b", vec!["BAZ".into()]),
        ];
        assert_eq!(
            tracker.evaluate(&events),
            RenderPass::Pending { template_id: "b".into() }
        );
    }

    #[test]
    fn pending_regardless_of_position() {
        let tracker = RenderTracker::new(2);
        let events = [
            RenderEvent::pending("b", vec!["BAZ".into()]),
            rendered("a", &["FOO"], "bar"),
        ];
        assert!(!tracker.evaluate(&events).is_complete());
    }

    #[test]
    fn complete_collects_assignments_in_order() {
        let tracker = RenderTracker::new(2);
        let events = [rendered("a", &["FOO"], "bar"), rendered("b", &["BAZ"], "qux")];
        assert_eq!(names(&tracker.evaluate(&events)), vec!["FOO=bar", "BAZ=qux"]);
    }

    #[test]
    fn duplicates_across_templates_are_kept() {
        let tracker = RenderTracker::new(2);
        let events = [rendered("a", &["FOO"], "one"), rendered("b", &["FOO"], "two")];
        assert_eq!(names(&tracker.evaluate(&events)), vec!["FOO=one", "FOO=two"]);
    }

    #[test]
    fn shared_template_feeds_every_mapping() {
        let tracker = RenderTracker::new(1);
        let events = [rendered("a", &["USER", "LOGIN"], "admin")];
        assert_eq!(names(&tracker.evaluate(&events)), vec!["USER=admin", "LOGIN=admin"]);
    }

    #[test]
    fn more_events_than_expected_still_complete() {
        let tracker = RenderTracker::new(1);
        let events = [rendered("a", &["A"], "1"), rendered("b", &["B"], "2")];
        assert_eq!(names(&tracker.evaluate(&events)), vec!["A=1", "B=2"]);
    }
}
