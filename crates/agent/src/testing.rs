//! Scripted and fault-injected collaborators for tests.
//!
//! Compiled for this crate's own tests and for downstream crates that enable
//! the `testing` feature.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use handoff_core::error::{MemoryError, ObservabilityError, ProviderError, ToolError};
use handoff_core::memory::MemoryBackend;
use handoff_core::observe::{
    ModelCallRecord, ObservabilitySink, RequestEnd, RequestStart, ToolCallRecord,
};
use handoff_core::provider::{ModelReply, Provider, ProviderRequest, ProviderResponse, Usage};
use handoff_core::tool::{Tool, ToolCallRequest};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// A provider that replays a script of responses and records every request.
///
/// Running past the end of the script is reported as a malformed response,
/// so a test that under-scripts fails with `ModelUnavailable`.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a final answer.
    pub fn then_answer(self, text: &str) -> Self {
        self.then(Ok(text_response(text)))
    }

    /// Queue a batch of tool calls.
    pub fn then_calls(self, calls: Vec<ToolCallRequest>) -> Self {
        self.then(Ok(calls_response(calls)))
    }

    /// Queue a transport failure.
    pub fn then_error(self, error: ProviderError) -> Self {
        self.then(Err(error))
    }

    fn then(self, step: Result<ProviderResponse, ProviderError>) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call_number = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ProviderError::InvalidResponse(format!(
                "ScriptedProvider: no response scripted for call #{call_number}"
            )))
        })
    }
}

/// A final-answer response.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        reply: ModelReply::answer(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A tool-call response.
pub fn calls_response(calls: Vec<ToolCallRequest>) -> ProviderResponse {
    ProviderResponse {
        reply: ModelReply::calls(calls),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn call(call_id: &str, tool_name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest::new(call_id, tool_name, arguments)
}

// ── Tools ──────────────────────────────────────────────────────────────────

/// Returns its `text` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes back the input"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        Ok(arguments["text"].clone())
    }
}

/// Always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        Err(ToolError::failed("failing", "upstream returned 500"))
    }
}

/// Panics inside `execute`.
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panicking"
    }
    fn description(&self) -> &str {
        "Panics"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        panic!("boom");
    }
}

/// Sleeps before answering.
pub struct SlowTool {
    delay: Duration,
}

impl SlowTool {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }
    fn description(&self) -> &str {
        "Takes its time"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!("finally"))
    }
}

/// Cancels the turn it runs in, then succeeds.
pub struct CancellingTool {
    token: CancellationToken,
}

impl CancellingTool {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Tool for CancellingTool {
    fn name(&self) -> &str {
        "cancel_turn"
    }
    fn description(&self) -> &str {
        "Cancels the current turn"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        self.token.cancel();
        Ok(json!("cancel requested"))
    }
}

// ── Memory ─────────────────────────────────────────────────────────────────

/// Every call errors.
#[derive(Default)]
pub struct FailingMemory {
    calls: AtomicUsize,
}

impl FailingMemory {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemoryBackend for FailingMemory {
    fn name(&self) -> &str {
        "failing"
    }

    async fn retrieve(&self, _text: &str, _user_id: &str) -> Result<Option<String>, MemoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MemoryError::QueryFailed("memory store unreachable".into()))
    }

    async fn store(&self, _input: &str, _answer: &str, _user_id: &str) -> Result<(), MemoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MemoryError::Storage("memory store unreachable".into()))
    }
}

/// Never answers within any reasonable timeout.
pub struct SlowMemory;

#[async_trait]
impl MemoryBackend for SlowMemory {
    fn name(&self) -> &str {
        "slow"
    }

    async fn retrieve(&self, _text: &str, _user_id: &str) -> Result<Option<String>, MemoryError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Some("too late".into()))
    }

    async fn store(&self, _input: &str, _answer: &str, _user_id: &str) -> Result<(), MemoryError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

// ── Observability ─────────────────────────────────────────────────────────

/// Every event errors; counts how many it was given.
#[derive(Default)]
pub struct FailingSink {
    calls: AtomicUsize,
}

impl FailingSink {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> Result<(), ObservabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ObservabilityError {
            sink: "failing".into(),
            reason: "collector offline".into(),
        })
    }
}

impl ObservabilitySink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }
    fn on_request_start(&self, _event: &RequestStart) -> Result<(), ObservabilityError> {
        self.fail()
    }
    fn on_model_call(&self, _event: &ModelCallRecord) -> Result<(), ObservabilityError> {
        self.fail()
    }
    fn on_tool_call(&self, _event: &ToolCallRecord) -> Result<(), ObservabilityError> {
        self.fail()
    }
    fn on_request_end(&self, _event: &RequestEnd) -> Result<(), ObservabilityError> {
        self.fail()
    }
    fn flush(&self) -> Result<(), ObservabilityError> {
        self.fail()
    }
}

/// Keeps what it is told.
#[derive(Default)]
pub struct RecordingSink {
    starts: Mutex<Vec<RequestStart>>,
    tools: Mutex<Vec<String>>,
    model_calls: AtomicUsize,
    ends: AtomicUsize,
}

impl RecordingSink {
    pub fn starts(&self) -> Vec<RequestStart> {
        self.starts.lock().unwrap().clone()
    }

    pub fn tool_calls(&self) -> Vec<String> {
        self.tools.lock().unwrap().clone()
    }

    pub fn model_calls(&self) -> usize {
        self.model_calls.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

impl ObservabilitySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }
    fn on_request_start(&self, event: &RequestStart) -> Result<(), ObservabilityError> {
        self.starts.lock().unwrap().push(event.clone());
        Ok(())
    }
    fn on_model_call(&self, _event: &ModelCallRecord) -> Result<(), ObservabilityError> {
        self.model_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn on_tool_call(&self, event: &ToolCallRecord) -> Result<(), ObservabilityError> {
        self.tools.lock().unwrap().push(event.tool_name.clone());
        Ok(())
    }
    fn on_request_end(&self, _event: &RequestEnd) -> Result<(), ObservabilityError> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
