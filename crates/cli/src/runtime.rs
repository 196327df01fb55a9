//! Assemble the agent from configuration.

use std::sync::Arc;

use handoff_agent::{AgentLoop, Session};
use handoff_config::{AppConfig, ConfigError};
use handoff_core::memory::MemoryBackend;
use handoff_core::provider::Provider;
use handoff_memory::{FileBackend, InMemoryBackend, NoopMemory};
use handoff_telemetry::TelemetryEngine;
use handoff_tools::{ToolOptions, default_registry, register_planner};
use tracing::info;

/// Everything a session needs, built once per process.
pub struct Runtime {
    pub agent: Arc<AgentLoop>,
    /// Present when `[telemetry] enabled`.
    pub telemetry: Option<Arc<TelemetryEngine>>,
    pub user_id: String,
}

impl Runtime {
    /// Start a conversation on the default persona.
    pub fn session(&self) -> Session {
        Session::new(self.agent.clone(), &self.user_id)
    }
}

/// The memory backend named by `[memory] backend`.
pub fn build_memory(config: &AppConfig) -> Arc<dyn MemoryBackend> {
    let limit = config.memory.recall_limit;
    match config.memory.backend.as_str() {
        "in_memory" => Arc::new(InMemoryBackend::new().with_recall_limit(limit)),
        "file" => Arc::new(FileBackend::new(config.memory_path()).with_recall_limit(limit)),
        _ => Arc::new(NoopMemory),
    }
}

/// Build the agent loop around `provider`.
///
/// Fails only when the persona set cannot be loaded (e.g. a missing
/// `prompt_file`).
pub fn build_runtime(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> Result<Runtime, ConfigError> {
    let personas = Arc::new(config.persona_registry()?);

    let mut registry = default_registry(&ToolOptions {
        workspace_dir: config.workspace_dir(),
        tavily_api_key: config.tools.tavily_api_key.clone(),
    });
    register_planner(&mut registry, provider.clone(), &config.default_model);
    let tools = Arc::new(registry);

    let memory = build_memory(config);

    info!(
        provider = provider.name(),
        model = %config.default_model,
        personas = personas.len(),
        tools = tools.len(),
        memory = memory.name(),
        "Building agent runtime"
    );

    let mut agent = AgentLoop::new(
        provider,
        &config.default_model,
        config.default_temperature,
        personas,
        tools,
    )
    .with_limits(config.agent.limits())
    .with_max_tokens(config.default_max_tokens)
    .with_memory(memory)
    .with_auto_save(config.memory.auto_save);

    let telemetry = config.telemetry.enabled.then(|| Arc::new(TelemetryEngine::new()));
    if let Some(engine) = &telemetry {
        agent = agent.with_observer(engine.clone());
    }

    Ok(Runtime {
        agent: Arc::new(agent),
        telemetry,
        user_id: config.agent.user_id.clone(),
    })
}
