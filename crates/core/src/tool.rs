//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give a persona the ability to act in the world:
//! search the web, do arithmetic, write notes, etc. Every invocation ends
//! in a [`ToolCallResult`], success or failure, so the model always sees
//! an answer for each call it made.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ToolError, TurnError};
use crate::provider::ToolDefinition;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub call_id: String,

    /// Name of the tool to execute
    pub tool_name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Normalised description of a failed call, as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorDetail {
    /// Stable snake_case category: `unknown_tool`, `invalid_arguments`,
    /// `execution_failed`, `timeout`, `panicked`, `delegation_depth_exceeded`, ...
    pub kind: String,

    /// Human-readable explanation
    pub message: String,
}

impl ToolErrorDetail {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&ToolError> for ToolErrorDetail {
    fn from(err: &ToolError) -> Self {
        let kind = match err {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
            ToolError::ExecutionFailed { .. } => "execution_failed",
            ToolError::Timeout { .. } => "timeout",
            ToolError::Panicked { .. } => "panicked",
        };
        Self::new(kind, err.to_string())
    }
}

impl From<&TurnError> for ToolErrorDetail {
    fn from(err: &TurnError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Success or failure of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok { payload: serde_json::Value },
    Error { error_detail: ToolErrorDetail },
}

/// The result of one tool call, correlated by `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The call ID this result is for
    pub call_id: String,

    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolCallResult {
    pub fn ok(call_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: ToolOutcome::Ok { payload },
        }
    }

    pub fn error(call_id: impl Into<String>, error_detail: ToolErrorDetail) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: ToolOutcome::Error { error_detail },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Ok { .. })
    }

    pub fn error_detail(&self) -> Option<&ToolErrorDetail> {
        match &self.outcome {
            ToolOutcome::Error { error_detail } => Some(error_detail),
            ToolOutcome::Ok { .. } => None,
        }
    }

    /// The text handed back to the model for this call.
    ///
    /// String payloads are passed through as-is; everything else is JSON.
    pub fn render(&self) -> String {
        match &self.outcome {
            ToolOutcome::Ok {
                payload: serde_json::Value::String(s),
            } => s.clone(),
            ToolOutcome::Ok { payload } => payload.to_string(),
            ToolOutcome::Error { error_detail } => serde_json::json!({
                "error": error_detail.kind,
                "message": error_detail.message,
            })
            .to_string(),
        }
    }
}

/// The core Tool trait.
///
/// Each tool (web_search, calculator, file_write, ...) implements this trait.
/// Tools are registered in the ToolRegistry and invoked through the
/// executor, which validates arguments against [`Tool::input_schema`] first.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM (filtered per persona)
/// 2. Look up tools when the LLM requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions_where(|_| true)
    }

    /// Definitions of the tools whose name passes `keep`, sorted by name.
    pub fn definitions_where(&self, keep: impl Fn(&str) -> bool) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| keep(t.name()))
            .map(|t| t.to_definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Ok(arguments["text"].clone())
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "named"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Ok(serde_json::Value::Null)
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_definitions_are_sorted_and_filterable() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(NamedTool("web_search")));
        registry.register(Box::new(NamedTool("calculator")));
        registry.register(Box::new(EchoTool));

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["calculator", "echo", "web_search"]);

        let only_search = registry.definitions_where(|n| n == "web_search");
        assert_eq!(only_search.len(), 1);
        assert_eq!(only_search[0].name, "web_search");
    }

    #[tokio::test]
    async fn tool_executes_directly() {
        let tool = EchoTool;
        let out = tool
            .execute(serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!("hello world"));
    }

    #[test]
    fn error_detail_kinds_are_stable() {
        let detail = ToolErrorDetail::from(&ToolError::UnknownTool("nope".into()));
        assert_eq!(detail.kind, "unknown_tool");

        let detail = ToolErrorDetail::from(&ToolError::Timeout {
            tool_name: "web_search".into(),
            timeout_secs: 30,
        });
        assert_eq!(detail.kind, "timeout");
        assert!(detail.message.contains("30s"));

        let detail = ToolErrorDetail::from(&TurnError::UnknownPersona("ghost".into()));
        assert_eq!(detail.kind, "unknown_persona");
    }

    #[test]
    fn result_serializes_with_status_tag() {
        let ok = ToolCallResult::ok("c1", serde_json::json!({"hits": 3}));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["call_id"], "c1");
        assert_eq!(json["payload"]["hits"], 3);

        let err = ToolCallResult::error("c2", ToolErrorDetail::new("timeout", "too slow"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_detail"]["kind"], "timeout");
    }

    #[test]
    fn render_passes_strings_through() {
        let ok = ToolCallResult::ok("c1", serde_json::json!("plain text"));
        assert_eq!(ok.render(), "plain text");

        let err = ToolCallResult::error("c2", ToolErrorDetail::new("unknown_tool", "Unknown tool: x"));
        let rendered: serde_json::Value = serde_json::from_str(&err.render()).unwrap();
        assert_eq!(rendered["error"], "unknown_tool");
    }
}
