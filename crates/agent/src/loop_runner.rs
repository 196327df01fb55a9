//! The orchestration loop implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use handoff_core::agent::TurnLimits;
use handoff_core::error::{ProviderError, TurnError};
use handoff_core::memory::MemoryBackend;
use handoff_core::message::ConversationHistory;
use handoff_core::observe::{
    ModelCallRecord, NoopSink, ObservabilitySink, RequestEnd, RequestOutcome, RequestStart,
    ToolCallRecord,
};
use handoff_core::persona::{PersonaContext, PersonaRegistry};
use handoff_core::provider::{ModelReply, Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use handoff_core::tool::{ToolCallRequest, ToolCallResult, ToolErrorDetail, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::best_effort::{MemoryGuard, ObserverGuard};
use crate::delegation::{self, DELEGATE_TOOL_NAME, DelegateArgs, DelegationFrame};
use crate::executor::ToolExecutor;

/// Per-turn identity and cancellation handle.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub session_id: String,
    pub user_id: String,
    pub cancel: CancellationToken,
}

impl TurnContext {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Where a turn sits in a delegation chain.
#[derive(Debug, Clone, Copy)]
struct Hop<'a> {
    depth: u32,
    parent_request_id: Option<&'a str>,
}

/// A user turn.
const ROOT: Hop<'static> = Hop {
    depth: 0,
    parent_request_id: None,
};

/// The orchestration loop: asks the model, runs the tools it requests,
/// feeds results back, and repeats until a final answer.
///
/// One `AgentLoop` is shared (via `Arc`) by every session; all per-turn
/// state lives in the [`ConversationHistory`] the caller passes in.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Model used by personas without an override
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Every persona this loop can run as
    personas: Arc<PersonaRegistry>,

    /// Tool lookup, validation and isolation
    executor: ToolExecutor,

    /// Optional memory backend for recall and auto-save
    memory: MemoryGuard,

    /// Lifecycle event sink
    observer: ObserverGuard,

    /// Iteration, depth and timeout bounds
    limits: TurnLimits,

    /// Whether to store (input, answer) pairs after each user turn
    auto_save: bool,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        personas: Arc<PersonaRegistry>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let limits = TurnLimits::default();
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            personas,
            executor: ToolExecutor::new(tools, limits.tool_timeout_secs),
            memory: MemoryGuard::new(None, limits.memory_timeout_secs),
            observer: ObserverGuard::new(Arc::new(NoopSink)),
            limits,
            auto_save: false,
        }
    }

    /// Set iteration, delegation depth and timeout bounds.
    pub fn with_limits(mut self, limits: TurnLimits) -> Self {
        self.executor.set_timeout(limits.tool_timeout_secs);
        self.memory.set_timeout(limits.memory_timeout_secs);
        self.limits = limits;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Attach a memory backend for recall (and auto-save, if enabled).
    pub fn with_memory(mut self, memory: Arc<dyn MemoryBackend>) -> Self {
        self.memory = MemoryGuard::new(Some(memory), self.limits.memory_timeout_secs);
        self
    }

    /// Enable or disable auto-save of completed user turns to memory.
    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    /// Attach an observability sink.
    pub fn with_observer(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.observer = ObserverGuard::new(sink);
        self
    }

    pub fn personas(&self) -> &PersonaRegistry {
        &self.personas
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    pub fn limits(&self) -> &TurnLimits {
        &self.limits
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Process one user turn for `persona_id` against `history`.
    ///
    /// On success the final answer has been appended to `history` and is
    /// returned verbatim. On failure everything appended so far stays in
    /// `history` and the session may carry on with the next turn.
    pub async fn process_turn(
        &self,
        history: &mut ConversationHistory,
        user_input: &str,
        persona_id: &str,
        ctx: &TurnContext,
    ) -> Result<String, TurnError> {
        let persona = self.personas.get(persona_id)?;

        info!(
            session_id = %ctx.session_id,
            persona = %persona.id,
            messages = history.len(),
            "Processing turn"
        );

        history.push_user(&persona.id, user_input);

        let digest = self.memory.retrieve(user_input, &ctx.user_id).await;

        let result = self
            .run_turn(history, persona, user_input, digest, ROOT, ctx)
            .await;

        if let Ok(answer) = &result
            && self.auto_save
        {
            self.memory.store_detached(user_input, answer, &ctx.user_id);
        }
        self.observer.flush();

        result
    }

    /// Run a task under `callee` on behalf of `caller`, as if `caller` were
    /// answering a user turn.
    ///
    /// The callee works in a fresh history derived from `caller_history`
    /// (same sequence clock, no shared messages). `caller_history` is not
    /// modified.
    pub async fn delegate(
        &self,
        caller_history: &ConversationHistory,
        caller: &str,
        callee: &str,
        task: &str,
        ctx: &TurnContext,
    ) -> Result<DelegationFrame, TurnError> {
        self.delegate_from(caller_history, caller, callee, task, ROOT, ctx)
            .await
    }

    async fn delegate_from(
        &self,
        caller_history: &ConversationHistory,
        caller: &str,
        callee: &str,
        task: &str,
        hop: Hop<'_>,
        ctx: &TurnContext,
    ) -> Result<DelegationFrame, TurnError> {
        let depth = hop.depth + 1;
        if depth > self.limits.max_delegation_depth {
            return Err(TurnError::DelegationDepthExceeded {
                caller: caller.to_string(),
                callee: callee.to_string(),
                depth,
                max_depth: self.limits.max_delegation_depth,
            });
        }

        let callee_persona = self.personas.get(callee)?;
        let mut frame = DelegationFrame::new(caller, callee, task, depth);

        info!(
            session_id = %ctx.session_id,
            caller = %caller,
            callee = %callee,
            depth,
            "Delegating task"
        );

        let mut sub_history = caller_history.derive();
        sub_history.push_user(&callee_persona.id, task);

        let answer = self
            .run_turn(
                &mut sub_history,
                callee_persona,
                task,
                None,
                Hop {
                    depth,
                    parent_request_id: hop.parent_request_id,
                },
                ctx,
            )
            .await?;

        debug!(callee = %callee, depth, "Delegated task completed");
        frame.result = Some(answer);
        Ok(frame)
    }

    /// One turn, top-level or delegated, bracketed by request events.
    ///
    /// Boxed because delegation recurses through here.
    fn run_turn<'a>(
        &'a self,
        history: &'a mut ConversationHistory,
        persona: Arc<PersonaContext>,
        input: &'a str,
        digest: Option<String>,
        hop: Hop<'a>,
        ctx: &'a TurnContext,
    ) -> BoxFuture<'a, Result<String, TurnError>> {
        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let started = Instant::now();

            self.observer.request_start(&RequestStart {
                request_id: request_id.clone(),
                parent_request_id: hop.parent_request_id.map(str::to_string),
                session_id: ctx.session_id.clone(),
                persona_id: persona.id.clone(),
                input: input.to_string(),
                depth: hop.depth,
            });

            let result = self
                .drive(history, &persona, digest, hop.depth, &request_id, ctx)
                .await;

            let outcome = match &result {
                Ok(text) => RequestOutcome::Answered { text: text.clone() },
                Err(e) => RequestOutcome::Failed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                },
            };
            self.observer.request_end(&RequestEnd {
                request_id,
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            });

            result
        })
    }

    /// The bounded ask-model / run-tools cycle.
    async fn drive(
        &self,
        history: &mut ConversationHistory,
        persona: &PersonaContext,
        digest: Option<String>,
        depth: u32,
        request_id: &str,
        ctx: &TurnContext,
    ) -> Result<String, TurnError> {
        let model = persona.model.clone().unwrap_or_else(|| self.model.clone());
        let system_prompt = compose_system_prompt(&persona.system_prompt, digest.as_deref());
        let tools = self.tool_definitions_for(persona, depth);

        for iteration in 1..=self.limits.max_iterations {
            if ctx.cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            debug!(
                session_id = %ctx.session_id,
                persona = %persona.id,
                iteration,
                depth,
                "Agent loop iteration"
            );

            let request = ProviderRequest {
                model: model.clone(),
                system_prompt: system_prompt.clone(),
                messages: history.snapshot(),
                tools: tools.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let response = self.call_model(request, persona, request_id, ctx).await?;

            if ctx.cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            match response.reply {
                ModelReply::FinalAnswer { text } => {
                    history.push_assistant(&persona.id, text.clone());
                    return Ok(text);
                }
                ModelReply::ToolCalls { text, calls } if calls.is_empty() => {
                    history.push_assistant(&persona.id, text.clone());
                    return Ok(text);
                }
                ModelReply::ToolCalls { text, calls } => {
                    let calls = unique_call_ids(calls, iteration);
                    debug!(tool_count = calls.len(), "Executing tool calls");
                    // The request goes in first so the history stays well formed
                    // whatever happens to the calls.
                    history.push_tool_calls(&persona.id, text, calls.clone());
                    self.run_calls(history, persona, &calls, depth, request_id, ctx)
                        .await?;
                }
            }
        }

        warn!(
            session_id = %ctx.session_id,
            persona = %persona.id,
            max_iterations = self.limits.max_iterations,
            "Turn limit reached without a final answer"
        );
        Err(TurnError::TurnLimitExceeded {
            persona: persona.id.clone(),
            max_iterations: self.limits.max_iterations,
        })
    }

    async fn call_model(
        &self,
        request: ProviderRequest,
        persona: &PersonaContext,
        request_id: &str,
        ctx: &TurnContext,
    ) -> Result<ProviderResponse, TurnError> {
        let model = request.model.clone();
        let timeout_secs = self.limits.model_timeout_secs;
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(TurnError::Cancelled),
            r = tokio::time::timeout(Duration::from_secs(timeout_secs), self.provider.complete(request)) => {
                r.unwrap_or(Err(ProviderError::Timeout(timeout_secs)))
            }
        };

        self.observer.model_call(&ModelCallRecord {
            request_id: request_id.to_string(),
            persona_id: persona.id.clone(),
            model: result
                .as_ref()
                .map(|r| r.model.clone())
                .unwrap_or(model),
            usage: result.as_ref().ok().and_then(|r| r.usage),
            duration_ms: started.elapsed().as_millis() as u64,
            success: result.is_ok(),
        });

        result.map_err(|e| {
            warn!(persona = %persona.id, error = %e, "Model call failed");
            TurnError::ModelUnavailable(e)
        })
    }

    /// Execute a batch in request order, appending one result per call.
    async fn run_calls(
        &self,
        history: &mut ConversationHistory,
        persona: &PersonaContext,
        calls: &[ToolCallRequest],
        depth: u32,
        request_id: &str,
        ctx: &TurnContext,
    ) -> Result<(), TurnError> {
        for (i, call) in calls.iter().enumerate() {
            let started = Instant::now();

            let result = if ctx.cancel.is_cancelled() {
                None
            } else if call.tool_name == DELEGATE_TOOL_NAME {
                self.run_delegate_call(history, persona, call, depth, request_id, ctx)
                    .await
            } else {
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => None,
                    r = self.executor.execute(persona, call) => Some(r),
                }
            };

            let Some(result) = result else {
                // Every requested call still gets an answer.
                let cancelled = ToolErrorDetail::from(&TurnError::Cancelled);
                for rest in &calls[i..] {
                    history.push_tool_result(
                        &persona.id,
                        ToolCallResult::error(&rest.call_id, cancelled.clone()),
                    );
                }
                return Err(TurnError::Cancelled);
            };

            self.observer.tool_call(&ToolCallRecord {
                request_id: request_id.to_string(),
                persona_id: persona.id.clone(),
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                arguments: call.arguments.clone(),
                success: result.is_ok(),
                duration_ms: started.elapsed().as_millis() as u64,
            });

            history.push_tool_result(&persona.id, result);
        }
        Ok(())
    }

    /// Handle a `delegate` call. `None` means the turn was cancelled.
    async fn run_delegate_call(
        &self,
        history: &ConversationHistory,
        persona: &PersonaContext,
        call: &ToolCallRequest,
        depth: u32,
        request_id: &str,
        ctx: &TurnContext,
    ) -> Option<ToolCallResult> {
        if !persona.allows(DELEGATE_TOOL_NAME) {
            let err = handoff_core::ToolError::UnknownTool(DELEGATE_TOOL_NAME.to_string());
            return Some(ToolCallResult::error(&call.call_id, ToolErrorDetail::from(&err)));
        }

        let args = match DelegateArgs::parse(&call.arguments) {
            Ok(args) => args,
            Err(reason) => {
                let err = handoff_core::ToolError::invalid(DELEGATE_TOOL_NAME, reason);
                return Some(ToolCallResult::error(&call.call_id, ToolErrorDetail::from(&err)));
            }
        };

        let hop = Hop {
            depth,
            parent_request_id: Some(request_id),
        };
        match self
            .delegate_from(history, &persona.id, &args.callee, &args.task, hop, ctx)
            .await
        {
            Ok(frame) => Some(ToolCallResult::ok(
                &call.call_id,
                serde_json::Value::String(frame.result.unwrap_or_default()),
            )),
            Err(TurnError::Cancelled) => None,
            Err(e) => {
                warn!(
                    caller = %persona.id,
                    callee = %args.callee,
                    error = %e,
                    "Delegation failed"
                );
                Some(ToolCallResult::error(&call.call_id, ToolErrorDetail::from(&e)))
            }
        }
    }

    /// Tools advertised to `persona` at `depth`, including `delegate` when
    /// the persona may use it and another hop is still possible.
    fn tool_definitions_for(&self, persona: &PersonaContext, depth: u32) -> Vec<ToolDefinition> {
        let mut defs = self.executor.definitions_for(persona);
        if persona.allows(DELEGATE_TOOL_NAME)
            && self.limits.can_delegate_from(depth)
            && self.personas.others(&persona.id).next().is_some()
        {
            defs.push(delegation::definition(&self.personas, &persona.id));
        }
        defs
    }
}

/// Results are matched to requests by `call_id`, so an empty or repeated
/// id from the model is replaced with a generated one.
fn unique_call_ids(mut calls: Vec<ToolCallRequest>, iteration: u32) -> Vec<ToolCallRequest> {
    let mut seen = HashSet::new();
    for (index, call) in calls.iter_mut().enumerate() {
        if call.call_id.is_empty() || seen.contains(&call.call_id) {
            let mut candidate = format!("call_{iteration}_{index}");
            while seen.contains(&candidate) {
                candidate.push('_');
            }
            warn!(
                original = %call.call_id,
                replacement = %candidate,
                "Replacing missing or duplicate tool call id"
            );
            call.call_id = candidate;
        }
        seen.insert(call.call_id.clone());
    }
    calls
}

/// Append the recalled digest to the persona's prompt. History is untouched.
fn compose_system_prompt(base: &str, digest: Option<&str>) -> String {
    match digest {
        Some(digest) => format!("{base}\n\n## Recalled Memories\n{digest}"),
        None => base.to_string(),
    }
}
