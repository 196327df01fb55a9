//! Observability sink: structured lifecycle events from the agent loop.
//!
//! Every turn (top-level or delegated) gets its own `request_id`; a delegated
//! turn carries its caller's id as `parent_request_id`, so a sink can rebuild
//! the delegation tree. Sink failures are reported as errors but the loop
//! never lets them affect a turn.

use serde::{Deserialize, Serialize};

use crate::error::ObservabilityError;
use crate::provider::Usage;

/// A turn is starting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStart {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_request_id: Option<String>,
    pub session_id: String,
    pub persona_id: String,
    pub input: String,
    /// 0 for a user turn, N for the Nth delegation hop.
    pub depth: u32,
}

/// One model invocation finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallRecord {
    pub request_id: String,
    pub persona_id: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub duration_ms: u64,
    pub success: bool,
}

/// One tool invocation finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub request_id: String,
    pub persona_id: String,
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    pub duration_ms: u64,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestOutcome {
    Answered { text: String },
    Failed { kind: String, message: String },
}

/// A turn finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnd {
    pub request_id: String,
    pub outcome: RequestOutcome,
    pub duration_ms: u64,
}

/// Receives structured lifecycle events.
///
/// Methods are synchronous and should be cheap; a sink that ships events
/// over the network should buffer and do the I/O in `flush` or on its own
/// task.
pub trait ObservabilitySink: Send + Sync {
    /// A human-readable sink name, used in logs.
    fn name(&self) -> &str;

    fn on_request_start(&self, event: &RequestStart) -> Result<(), ObservabilityError>;

    fn on_model_call(&self, event: &ModelCallRecord) -> Result<(), ObservabilityError>;

    fn on_tool_call(&self, event: &ToolCallRecord) -> Result<(), ObservabilityError>;

    fn on_request_end(&self, event: &RequestEnd) -> Result<(), ObservabilityError>;

    /// Push out anything buffered.
    fn flush(&self) -> Result<(), ObservabilityError> {
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    fn on_request_start(&self, _event: &RequestStart) -> Result<(), ObservabilityError> {
        Ok(())
    }

    fn on_model_call(&self, _event: &ModelCallRecord) -> Result<(), ObservabilityError> {
        Ok(())
    }

    fn on_tool_call(&self, _event: &ToolCallRecord) -> Result<(), ObservabilityError> {
        Ok(())
    }

    fn on_request_end(&self, _event: &RequestEnd) -> Result<(), ObservabilityError> {
        Ok(())
    }
}
