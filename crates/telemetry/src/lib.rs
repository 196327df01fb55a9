//! Execution tracing and usage accounting for handoff.
//!
//! [`TelemetryEngine`] is an observability sink: it turns the agent loop's
//! lifecycle events into a [`Trace`] per user turn, with a span for every
//! model call, tool call and delegated sub-turn.

pub mod engine;
pub mod model;

pub use engine::TelemetryEngine;
pub use model::{Span, SpanKind, Trace, UsageSnapshot};
