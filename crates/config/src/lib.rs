//! Configuration loading, validation, and management for handoff.
//!
//! Loads configuration from `~/.handoff/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use handoff_core::agent::{MAX_DELEGATION_DEPTH_CEILING, TurnLimits};
use handoff_core::persona::{PersonaContext, PersonaRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Id of the persona used when none are configured.
pub const BUILTIN_PERSONA_ID: &str = "default";

const BUILTIN_PERSONA_PROMPT: &str = "You are a helpful assistant. Use the available tools when \
they help you answer, and answer concisely.";

const MAX_ITERATIONS_CEILING: u32 = 100;

/// The root configuration structure.
///
/// Maps directly to `~/.handoff/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Persona that answers user input when the session starts
    #[serde(default = "default_persona")]
    pub default_persona: String,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personas: Vec<PersonaConfig>,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Directory relative `prompt_file`s resolve against (the config file's).
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_persona() -> String {
    BUILTIN_PERSONA_ID.into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("default_persona", &self.default_persona)
            .field("personas", &self.personas)
            .field("memory", &self.memory)
            .field("telemetry", &self.telemetry)
            .field("tools", &self.tools)
            .finish()
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("workspace_dir", &self.workspace_dir)
            .field("tavily_api_key", &redact(&self.tavily_api_key))
            .finish()
    }
}

/// `[agent]`: turn limits and identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: u32,

    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_memory_timeout")]
    pub memory_timeout_secs: u64,

    /// Whose memories are recalled and stored
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_max_iterations() -> u32 {
    TurnLimits::default().max_iterations
}
fn default_max_delegation_depth() -> u32 {
    TurnLimits::default().max_delegation_depth
}
fn default_model_timeout() -> u64 {
    TurnLimits::default().model_timeout_secs
}
fn default_tool_timeout() -> u64 {
    TurnLimits::default().tool_timeout_secs
}
fn default_memory_timeout() -> u64 {
    TurnLimits::default().memory_timeout_secs
}
fn default_user_id() -> String {
    "default_user".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_delegation_depth: default_max_delegation_depth(),
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            memory_timeout_secs: default_memory_timeout(),
            user_id: default_user_id(),
        }
    }
}

impl AgentConfig {
    pub fn limits(&self) -> TurnLimits {
        TurnLimits {
            max_iterations: self.max_iterations,
            max_delegation_depth: self.max_delegation_depth,
            model_timeout_secs: self.model_timeout_secs,
            tool_timeout_secs: self.tool_timeout_secs,
            memory_timeout_secs: self.memory_timeout_secs,
        }
    }
}

/// `[[personas]]`: one role the model can play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub id: String,

    /// One line shown to other personas deciding whom to delegate to
    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// File holding the system prompt, used verbatim (trimmed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,

    /// Tool allowlist. Absent means every registered tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,

    /// Model override for this persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// `[memory]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// `none`, `in_memory` or `file`
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Store each answered user turn
    #[serde(default = "default_true")]
    pub auto_save: bool,

    /// Entries per recalled digest
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Storage file for the `file` backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

pub const MEMORY_BACKENDS: &[&str] = &["none", "in_memory", "file"];

fn default_memory_backend() -> String {
    "in_memory".into()
}
fn default_recall_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            auto_save: true,
            recall_limit: default_recall_limit(),
            path: None,
        }
    }
}

/// `[telemetry]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// `[tools]`
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Where `file_write` puts files. Defaults to `~/.handoff/workspace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tavily_api_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.handoff/config.toml).
    ///
    /// Environment variables override the file; see [`AppConfig::apply_env`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load `path`, then apply environment overrides and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Apply environment overrides through `lookup`:
    /// - `HANDOFF_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`
    ///   when the file has no key
    /// - `HANDOFF_MODEL`, `HANDOFF_API_URL`
    /// - `TAVILY_API_KEY` when the file has no Tavily key
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = non_empty("HANDOFF_API_KEY")
                .or_else(|| non_empty("OPENROUTER_API_KEY"))
                .or_else(|| non_empty("OPENAI_API_KEY"));
        }
        if let Some(model) = non_empty("HANDOFF_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = non_empty("HANDOFF_API_URL") {
            self.api_url = url;
        }
        if self.tools.tavily_api_key.is_none() {
            self.tools.tavily_api_key = non_empty("TAVILY_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".handoff")
    }

    /// Where `file_write` puts files.
    pub fn workspace_dir(&self) -> PathBuf {
        self.tools
            .workspace_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    /// Storage file for the `file` memory backend.
    pub fn memory_path(&self) -> PathBuf {
        self.memory
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("memory").join("memories.jsonl"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if !(0.0..=2.0).contains(&self.default_temperature) {
            return invalid("default_temperature must be between 0.0 and 2.0".into());
        }
        let agent = &self.agent;
        if !(1..=MAX_ITERATIONS_CEILING).contains(&agent.max_iterations) {
            return invalid(format!(
                "agent.max_iterations must be between 1 and {MAX_ITERATIONS_CEILING}"
            ));
        }
        if agent.max_delegation_depth > MAX_DELEGATION_DEPTH_CEILING {
            return invalid(format!(
                "agent.max_delegation_depth must be at most {MAX_DELEGATION_DEPTH_CEILING}"
            ));
        }
        if agent.model_timeout_secs == 0
            || agent.tool_timeout_secs == 0
            || agent.memory_timeout_secs == 0
        {
            return invalid("agent timeouts must be greater than zero".into());
        }
        if agent.user_id.trim().is_empty() {
            return invalid("agent.user_id must not be empty".into());
        }

        let mut seen = BTreeSet::new();
        for persona in &self.personas {
            if persona.id.trim().is_empty() {
                return invalid("persona id must not be empty".into());
            }
            if !seen.insert(persona.id.as_str()) {
                return invalid(format!("duplicate persona id '{}'", persona.id));
            }
            match (&persona.system_prompt, &persona.prompt_file) {
                (Some(_), Some(_)) => {
                    return invalid(format!(
                        "persona '{}' sets both system_prompt and prompt_file",
                        persona.id
                    ));
                }
                (None, None) => {
                    return invalid(format!(
                        "persona '{}' needs a system_prompt or a prompt_file",
                        persona.id
                    ));
                }
                _ => {}
            }
        }
        let default_known = if self.personas.is_empty() {
            self.default_persona == BUILTIN_PERSONA_ID
        } else {
            seen.contains(self.default_persona.as_str())
        };
        if !default_known {
            return invalid(format!(
                "default persona '{}' not found in personas",
                self.default_persona
            ));
        }

        if !MEMORY_BACKENDS.contains(&self.memory.backend.as_str()) {
            return invalid(format!(
                "memory.backend must be one of {}",
                MEMORY_BACKENDS.join(", ")
            ));
        }
        if self.memory.recall_limit == 0 {
            return invalid("memory.recall_limit must be at least 1".into());
        }

        Ok(())
    }

    /// Build the persona registry, reading prompt files.
    pub fn persona_registry(&self) -> Result<PersonaRegistry, ConfigError> {
        if self.personas.is_empty() {
            let builtin = PersonaContext::new(BUILTIN_PERSONA_ID, BUILTIN_PERSONA_PROMPT)
                .with_description("General-purpose assistant");
            return Ok(PersonaRegistry::single(builtin));
        }

        let mut personas = Vec::with_capacity(self.personas.len());
        for p in &self.personas {
            let prompt = match (&p.system_prompt, &p.prompt_file) {
                (Some(prompt), _) => prompt.clone(),
                (None, Some(file)) => self.read_prompt_file(&p.id, file)?,
                (None, None) => {
                    return Err(ConfigError::ValidationError(format!(
                        "persona '{}' needs a system_prompt or a prompt_file",
                        p.id
                    )));
                }
            };
            let mut persona = PersonaContext::new(&p.id, prompt).with_description(&p.description);
            if let Some(tools) = &p.tools {
                persona = persona.with_tools(tools.iter().cloned());
            }
            if let Some(model) = &p.model {
                persona = persona.with_model(model);
            }
            personas.push(persona);
        }

        PersonaRegistry::new(personas, &self.default_persona)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    fn read_prompt_file(&self, persona_id: &str, file: &Path) -> Result<String, ConfigError> {
        let path = match &self.base_dir {
            Some(base) if file.is_relative() => base.join(file),
            _ => file.to_path_buf(),
        };
        std::fs::read_to_string(&path)
            .map(|text| text.trim().to_string())
            .map_err(|e| ConfigError::PromptFile {
                persona: persona_id.to_string(),
                path,
                reason: e.to_string(),
            })
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            default_persona: default_persona(),
            personas: Vec::new(),
            memory: MemoryConfig::default(),
            telemetry: TelemetryConfig::default(),
            tools: ToolsConfig::default(),
            base_dir: None,
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to read prompt file for persona '{persona}' at {path}: {reason}")]
    PromptFile {
        persona: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn parse(toml_str: &str) -> AppConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.agent.max_iterations, 25);
        assert_eq!(config.agent.max_delegation_depth, 2);
        assert_eq!(config.memory.backend, "in_memory");
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = AppConfig::default_toml();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.api_url, default_api_url());
        assert_eq!(parsed.agent.user_id, "default_user");
        assert!(toml_str.contains("[agent]"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_persona, "default");
    }

    #[test]
    fn limits_are_validated() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
        config.agent.max_iterations = 101;
        assert!(config.validate().is_err());
        config.agent.max_iterations = 100;
        config.agent.max_delegation_depth = 6;
        assert!(config.validate().is_err());
        config.agent.max_delegation_depth = 5;
        config.validate().unwrap();

        config.default_temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_memory_backend_rejected() {
        let config = parse("[memory]\nbackend = \"sqlite\"\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("memory.backend"));
    }

    #[test]
    fn personas_parse_into_registry() {
        let config = parse(
            r#"
default_persona = "planner"

[[personas]]
id = "planner"
description = "Breaks work down and delegates"
system_prompt = "You plan."
tools = ["delegate", "calculator"]

[[personas]]
id = "joke_writer"
description = "Writes jokes"
system_prompt = "You write jokes."
model = "openai/gpt-4o"
"#,
        );
        config.validate().unwrap();
        let registry = config.persona_registry().unwrap();
        assert_eq!(registry.default_id(), "planner");
        let planner = registry.get("planner").unwrap();
        assert!(planner.allows("delegate"));
        assert!(!planner.allows("web_search"));
        let writer = registry.get("joke_writer").unwrap();
        assert!(writer.allows("web_search"));
        assert_eq!(writer.model.as_deref(), Some("openai/gpt-4o"));
    }

    #[test]
    fn empty_personas_yield_builtin_default() {
        let registry = AppConfig::default().persona_registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.default_id(), BUILTIN_PERSONA_ID);
    }

    #[test]
    fn default_persona_must_exist() {
        let config = parse(
            r#"
default_persona = "ghost"

[[personas]]
id = "planner"
system_prompt = "You plan."
"#,
        );
        assert!(config.validate().is_err());

        let config = parse("default_persona = \"ghost\"\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn persona_needs_exactly_one_prompt_source() {
        let neither = parse("[[personas]]\nid = \"default\"\n");
        assert!(neither.validate().is_err());

        let both = parse(
            "[[personas]]\nid = \"default\"\nsystem_prompt = \"x\"\nprompt_file = \"p.md\"\n",
        );
        assert!(both.validate().is_err());
    }

    #[test]
    fn duplicate_persona_rejected() {
        let config = parse(
            r#"
[[personas]]
id = "default"
system_prompt = "a"

[[personas]]
id = "default"
system_prompt = "b"
"#,
        );
        assert!(config.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn prompt_file_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("personas")).unwrap();
        let mut prompt = std::fs::File::create(dir.path().join("personas/writer.md")).unwrap();
        writeln!(prompt, "# Joke writer\n\nYou write short jokes.\n").unwrap();

        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[[personas]]\nid = \"default\"\nprompt_file = \"personas/writer.md\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&config_path).unwrap();
        let registry = config.persona_registry().unwrap();
        assert_eq!(
            registry.get("default").unwrap().system_prompt,
            "# Joke writer\n\nYou write short jokes."
        );
    }

    #[test]
    fn missing_prompt_file_is_reported() {
        let config = parse("[[personas]]\nid = \"default\"\nprompt_file = \"/nope/p.md\"\n");
        let err = config.persona_registry().unwrap_err();
        assert!(matches!(err, ConfigError::PromptFile { .. }));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENROUTER_API_KEY", "sk-or"),
            ("OPENAI_API_KEY", "sk-oa"),
            ("HANDOFF_MODEL", "openai/gpt-4o"),
            ("TAVILY_API_KEY", "tvly-1"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-or"));
        assert_eq!(config.default_model, "openai/gpt-4o");
        assert_eq!(config.tools.tavily_api_key.as_deref(), Some("tvly-1"));
        assert_eq!(config.api_url, default_api_url());
    }

    #[test]
    fn file_key_wins_over_env() {
        let mut config = parse("api_key = \"from-file\"\n");
        config.apply_env(|k| (k == "HANDOFF_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = parse("api_key = \"sk-secret\"\n[tools]\ntavily_api_key = \"tvly-secret\"\n");
        config.base_dir = None;
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("tvly-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
