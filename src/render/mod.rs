//! Render events and the completeness check.
//!
//! ## Contents
//! - [`RenderEvent`] one per logical template, as reported by the rendering engine
//! - [`EnvVar`] a `NAME=value` environment assignment
//! - [`RenderTracker`] decides whether a batch of events is a finished rendering pass

mod event;
mod tracker;

pub use event::{EnvVar, RenderEvent};
pub use tracker::{RenderPass, RenderTracker};
