//! Data model for execution traces, spans and usage snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Top-level turn (user message → final response).
    Turn,
    /// A sub-turn run on behalf of another persona.
    Delegation,
    /// A model completion call.
    LlmCall,
    /// A tool execution.
    ToolExecution,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Turn => write!(f, "turn"),
            Self::Delegation => write!(f, "delegation"),
            Self::LlmCall => write!(f, "llm_call"),
            Self::ToolExecution => write!(f, "tool_execution"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    /// Parent span id (None for the turn span).
    pub parent_id: Option<String>,
    pub kind: SpanKind,
    /// Persona, model or tool name.
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// None while still running.
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub success: Option<bool>,
    /// Arbitrary metadata (request ids, call ids, error kinds).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            prompt_tokens: None,
            completion_tokens: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// A span for work that already finished, taking `duration_ms` up to now.
    pub fn completed(
        kind: SpanKind,
        label: impl Into<String>,
        duration_ms: u64,
        success: bool,
    ) -> Self {
        let now = Utc::now();
        let mut span = Self::new(kind, label);
        span.started_at = now - Duration::milliseconds(duration_ms as i64);
        span.ended_at = Some(now);
        span.duration_ms = Some(duration_ms);
        span.success = Some(success);
        span
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Mark the span as ended. A reported duration wins over wall clock.
    pub fn end(&mut self, success: bool, duration_ms: Option<u64>) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(duration_ms.unwrap_or_else(|| {
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64
        }));
        self.success = Some(success);
    }

    pub fn record_tokens(&mut self, prompt: u32, completion: u32) {
        self.prompt_tokens = Some(prompt);
        self.completion_tokens = Some(completion);
    }

    /// Prompt plus completion tokens, or 0 if not recorded.
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.unwrap_or(0) + self.completion_tokens.unwrap_or(0)
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// All spans of one user turn, delegated sub-turns included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    /// Session this turn belongs to.
    pub session_id: String,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trace {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn span_mut(&mut self, span_id: &str) -> Option<&mut Span> {
        self.spans.iter_mut().find(|s| s.id == span_id)
    }

    /// The turn span, if the trace has one.
    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.parent_id.is_none())
    }

    /// Direct children of `span_id`, in recording order.
    pub fn children<'a>(&'a self, span_id: &'a str) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans
            .iter()
            .filter(move |s| s.parent_id.as_deref() == Some(span_id))
    }

    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn total_tokens(&self) -> u32 {
        self.spans.iter().map(Span::total_tokens).sum()
    }

    pub fn count(&self, kind: SpanKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// A point-in-time usage snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// User turns started.
    pub requests: u64,
    /// Delegated sub-turns started.
    pub delegations: u64,
    /// Turns (of either kind) that ended in an error.
    pub failed_requests: u64,
    pub model_calls: u64,
    pub tool_calls: u64,
    pub failed_tool_calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Traces currently retained.
    pub trace_count: u64,
}

impl UsageSnapshot {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}
