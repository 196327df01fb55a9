//! Thread-safe telemetry engine. Collects spans per turn and keeps running
//! usage totals.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use chrono::Utc;
use handoff_core::error::ObservabilityError;
use handoff_core::observe::{
    ModelCallRecord, ObservabilitySink, RequestEnd, RequestOutcome, RequestStart, ToolCallRecord,
};
use tracing::debug;

use crate::model::{Span, SpanKind, Trace, UsageSnapshot};

/// Completed traces retained before the oldest are pruned.
const MAX_TRACES: usize = 5_000;

const SINK_NAME: &str = "telemetry";

/// Collects one [`Trace`] per user turn.
///
/// A delegated sub-turn becomes a `delegation` span inside its caller's
/// trace, parented to the caller's turn (or delegation) span.
pub struct TelemetryEngine {
    state: RwLock<State>,
    max_traces: usize,
}

#[derive(Default)]
struct State {
    /// All retained traces (most recent last).
    traces: Vec<Trace>,
    /// Requests that started but have not ended yet.
    open: HashMap<String, OpenRequest>,
    usage: UsageSnapshot,
}

struct OpenRequest {
    trace_id: String,
    span_id: String,
    root: bool,
}

impl State {
    fn trace_mut(&mut self, trace_id: &str) -> Option<&mut Trace> {
        self.traces.iter_mut().find(|t| t.id == trace_id)
    }

    /// Add a finished child span under the span of `request_id`.
    fn attach(&mut self, request_id: &str, span: Span) -> Result<(), ObservabilityError> {
        let (trace_id, parent) = self
            .open
            .get(request_id)
            .map(|r| (r.trace_id.clone(), r.span_id.clone()))
            .ok_or_else(|| unknown_request(request_id))?;
        let trace = self
            .trace_mut(&trace_id)
            .ok_or_else(|| unknown_request(request_id))?;
        trace.add_span(span.with_parent(parent));
        Ok(())
    }

    /// Drop the oldest completed traces once over `max`.
    fn prune(&mut self, max: usize) {
        if self.traces.len() < max {
            return;
        }
        let drain_count = (max / 10).max(1);
        let mut removed = 0;
        self.traces.retain(|t| {
            if removed >= drain_count || t.ended_at.is_none() {
                return true;
            }
            removed += 1;
            false
        });
        debug!(removed, "Pruned completed traces");
    }
}

fn unknown_request(request_id: &str) -> ObservabilityError {
    ObservabilityError {
        sink: SINK_NAME.into(),
        reason: format!("unknown request id: {request_id}"),
    }
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self::with_max_traces(MAX_TRACES)
    }

    /// An engine that retains at most `max_traces` completed traces.
    pub fn with_max_traces(max_traces: usize) -> Self {
        Self {
            state: RwLock::new(State::default()),
            max_traces: max_traces.max(1),
        }
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, ObservabilityError> {
        self.state.write().map_err(|_| ObservabilityError {
            sink: SINK_NAME.into(),
            reason: "telemetry state lock poisoned".into(),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        self.read(|s| s.traces.iter().find(|t| t.id == trace_id).cloned())
    }

    /// Recent traces, most recent first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        self.read(|s| s.traces.iter().rev().take(limit).cloned().collect())
    }

    pub fn traces_for_session(&self, session_id: &str) -> Vec<Trace> {
        self.read(|s| {
            s.traces
                .iter()
                .filter(|t| t.session_id == session_id)
                .cloned()
                .collect()
        })
    }

    pub fn trace_count(&self) -> usize {
        self.read(|s| s.traces.len())
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.read(|s| UsageSnapshot {
            trace_count: s.traces.len() as u64,
            ..s.usage.clone()
        })
    }

    /// Drop traces that started before `cutoff`. Returns how many went.
    pub fn prune_before(&self, cutoff: chrono::DateTime<Utc>) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let before = state.traces.len();
        state.traces.retain(|t| t.started_at >= cutoff);
        before - state.traces.len()
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservabilitySink for TelemetryEngine {
    fn name(&self) -> &str {
        SINK_NAME
    }

    fn on_request_start(&self, event: &RequestStart) -> Result<(), ObservabilityError> {
        let mut state = self.write()?;

        let parent = event
            .parent_request_id
            .as_deref()
            .and_then(|p| state.open.get(p))
            .map(|r| (r.trace_id.clone(), r.span_id.clone()));

        let (trace_id, span) = match parent {
            Some((trace_id, parent_span)) => {
                state.usage.delegations += 1;
                let span = Span::new(SpanKind::Delegation, &event.persona_id)
                    .with_parent(parent_span);
                (trace_id, span)
            }
            None => {
                if let Some(p) = &event.parent_request_id {
                    return Err(unknown_request(p));
                }
                state.usage.requests += 1;
                state.prune(self.max_traces);
                let trace = Trace::new(&event.session_id);
                let trace_id = trace.id.clone();
                state.traces.push(trace);
                (trace_id, Span::new(SpanKind::Turn, &event.persona_id))
            }
        };

        let span = span
            .with_meta("request_id", event.request_id.as_str())
            .with_meta("depth", event.depth);
        let open = OpenRequest {
            trace_id: trace_id.clone(),
            span_id: span.id.clone(),
            root: event.parent_request_id.is_none(),
        };
        state
            .trace_mut(&trace_id)
            .ok_or_else(|| unknown_request(&event.request_id))?
            .add_span(span);
        state.open.insert(event.request_id.clone(), open);
        Ok(())
    }

    fn on_model_call(&self, event: &ModelCallRecord) -> Result<(), ObservabilityError> {
        let mut state = self.write()?;
        let mut span = Span::completed(
            SpanKind::LlmCall,
            &event.model,
            event.duration_ms,
            event.success,
        );
        if let Some(usage) = event.usage {
            span.record_tokens(usage.prompt_tokens, usage.completion_tokens);
        }
        state.attach(&event.request_id, span)?;

        state.usage.model_calls += 1;
        if let Some(usage) = event.usage {
            state.usage.prompt_tokens += u64::from(usage.prompt_tokens);
            state.usage.completion_tokens += u64::from(usage.completion_tokens);
        }
        Ok(())
    }

    fn on_tool_call(&self, event: &ToolCallRecord) -> Result<(), ObservabilityError> {
        let mut state = self.write()?;
        let span = Span::completed(
            SpanKind::ToolExecution,
            &event.tool_name,
            event.duration_ms,
            event.success,
        )
        .with_meta("call_id", event.call_id.as_str());
        state.attach(&event.request_id, span)?;

        state.usage.tool_calls += 1;
        if !event.success {
            state.usage.failed_tool_calls += 1;
        }
        Ok(())
    }

    fn on_request_end(&self, event: &RequestEnd) -> Result<(), ObservabilityError> {
        let mut state = self.write()?;
        let open = state
            .open
            .remove(&event.request_id)
            .ok_or_else(|| unknown_request(&event.request_id))?;

        let success = matches!(event.outcome, RequestOutcome::Answered { .. });
        if !success {
            state.usage.failed_requests += 1;
        }

        let trace = state
            .trace_mut(&open.trace_id)
            .ok_or_else(|| unknown_request(&event.request_id))?;
        if let Some(span) = trace.span_mut(&open.span_id) {
            span.end(success, Some(event.duration_ms));
            if let RequestOutcome::Failed { kind, .. } = &event.outcome {
                span.metadata
                    .insert("error_kind".into(), kind.clone().into());
            }
        }
        if open.root {
            trace.end();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::provider::Usage;

    fn start(request_id: &str, parent: Option<&str>, persona: &str, depth: u32) -> RequestStart {
        RequestStart {
            request_id: request_id.into(),
            parent_request_id: parent.map(String::from),
            session_id: "session-1".into(),
            persona_id: persona.into(),
            input: "hi".into(),
            depth,
        }
    }

    fn model_call(request_id: &str, tokens: Option<(u32, u32)>) -> ModelCallRecord {
        ModelCallRecord {
            request_id: request_id.into(),
            persona_id: "planner".into(),
            model: "gpt-4o-mini".into(),
            usage: tokens.map(|(p, c)| Usage {
                prompt_tokens: p,
                completion_tokens: c,
                total_tokens: p + c,
            }),
            duration_ms: 12,
            success: true,
        }
    }

    fn tool_call(request_id: &str, success: bool) -> ToolCallRecord {
        ToolCallRecord {
            request_id: request_id.into(),
            persona_id: "planner".into(),
            call_id: "c1".into(),
            tool_name: "calculator".into(),
            arguments: serde_json::json!({"expression": "1+1"}),
            success,
            duration_ms: 3,
        }
    }

    fn end(request_id: &str, ok: bool) -> RequestEnd {
        RequestEnd {
            request_id: request_id.into(),
            outcome: if ok {
                RequestOutcome::Answered { text: "done".into() }
            } else {
                RequestOutcome::Failed {
                    kind: "turn_limit_exceeded".into(),
                    message: "too many iterations".into(),
                }
            },
            duration_ms: 40,
        }
    }

    #[test]
    fn single_turn_trace() {
        let engine = TelemetryEngine::new();
        engine.on_request_start(&start("r1", None, "planner", 0)).unwrap();
        engine.on_model_call(&model_call("r1", Some((100, 20)))).unwrap();
        engine.on_tool_call(&tool_call("r1", true)).unwrap();
        engine.on_model_call(&model_call("r1", Some((150, 30)))).unwrap();
        engine.on_request_end(&end("r1", true)).unwrap();

        let trace = &engine.recent_traces(1)[0];
        assert!(trace.ended_at.is_some());
        assert_eq!(trace.session_id, "session-1");
        let root = trace.root().unwrap();
        assert_eq!(root.kind, SpanKind::Turn);
        assert_eq!(root.duration_ms, Some(40));
        assert_eq!(trace.children(&root.id).count(), 3);
        assert_eq!(trace.total_tokens(), 300);

        let usage = engine.usage_snapshot();
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.model_calls, 2);
        assert_eq!(usage.tool_calls, 1);
        assert_eq!(usage.total_tokens(), 300);
        assert_eq!(usage.trace_count, 1);
    }

    #[test]
    fn delegation_nests_inside_caller_trace() {
        let engine = TelemetryEngine::new();
        engine.on_request_start(&start("r1", None, "planner", 0)).unwrap();
        engine.on_model_call(&model_call("r1", None)).unwrap();
        engine
            .on_request_start(&start("r2", Some("r1"), "joke_writer", 1))
            .unwrap();
        engine.on_model_call(&model_call("r2", Some((10, 5)))).unwrap();
        engine.on_request_end(&end("r2", true)).unwrap();

        // The sub-turn ended but the user turn has not.
        assert!(engine.recent_traces(1)[0].ended_at.is_none());
        engine.on_request_end(&end("r1", true)).unwrap();

        assert_eq!(engine.trace_count(), 1);
        let trace = &engine.recent_traces(1)[0];
        let root = trace.root().unwrap();
        let delegation = trace
            .children(&root.id)
            .find(|s| s.kind == SpanKind::Delegation)
            .unwrap();
        assert_eq!(delegation.label, "joke_writer");
        assert_eq!(delegation.metadata["depth"], 1);
        assert_eq!(trace.children(&delegation.id).count(), 1);

        let usage = engine.usage_snapshot();
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.delegations, 1);
    }

    #[test]
    fn failures_are_counted() {
        let engine = TelemetryEngine::new();
        engine.on_request_start(&start("r1", None, "planner", 0)).unwrap();
        engine.on_tool_call(&tool_call("r1", false)).unwrap();
        engine.on_request_end(&end("r1", false)).unwrap();

        let usage = engine.usage_snapshot();
        assert_eq!(usage.failed_tool_calls, 1);
        assert_eq!(usage.failed_requests, 1);
        let trace = &engine.recent_traces(1)[0];
        let root = trace.root().unwrap();
        assert_eq!(root.success, Some(false));
        assert_eq!(root.metadata["error_kind"], "turn_limit_exceeded");
    }

    #[test]
    fn unknown_request_is_an_error() {
        let engine = TelemetryEngine::new();
        let err = engine.on_model_call(&model_call("ghost", None)).unwrap_err();
        assert!(err.reason.contains("ghost"));
        assert!(engine.on_request_end(&end("ghost", true)).is_err());
        assert!(
            engine
                .on_request_start(&start("r2", Some("ghost"), "x", 1))
                .is_err()
        );
    }

    #[test]
    fn sessions_are_separated() {
        let engine = TelemetryEngine::new();
        engine.on_request_start(&start("r1", None, "planner", 0)).unwrap();
        engine.on_request_end(&end("r1", true)).unwrap();
        assert_eq!(engine.traces_for_session("session-1").len(), 1);
        assert!(engine.traces_for_session("other").is_empty());
    }

    #[test]
    fn completed_traces_are_auto_pruned() {
        let engine = TelemetryEngine::with_max_traces(10);
        for i in 0..25 {
            let id = format!("r{i}");
            engine.on_request_start(&start(&id, None, "planner", 0)).unwrap();
            engine.on_request_end(&end(&id, true)).unwrap();
        }
        assert!(engine.trace_count() <= 10);
        assert_eq!(engine.usage_snapshot().requests, 25);
    }

    #[test]
    fn prune_before_cutoff() {
        let engine = TelemetryEngine::new();
        engine.on_request_start(&start("r1", None, "planner", 0)).unwrap();
        engine.on_request_end(&end("r1", true)).unwrap();
        let removed = engine.prune_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(removed, 1);
        assert_eq!(engine.trace_count(), 0);
    }
}
