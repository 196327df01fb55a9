//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider takes a persona's system prompt, its history and the tools it
//! may call, and returns either a final answer or a batch of tool calls.
//!
//! Implementations: OpenAI-compatible endpoints (OpenRouter, OpenAI, Ollama),
//! plus scripted providers in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCallRequest;

/// One model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// The persona's system prompt, plus any recalled memory digest
    pub system_prompt: String,

    /// The persona's conversation so far
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelReply {
    /// The turn is finished.
    FinalAnswer { text: String },

    /// Run these tools, in order, and ask again.
    ToolCalls {
        #[serde(default)]
        text: String,
        calls: Vec<ToolCallRequest>,
    },
}

impl ModelReply {
    pub fn answer(text: impl Into<String>) -> Self {
        Self::FinalAnswer { text: text.into() }
    }

    pub fn calls(calls: Vec<ToolCallRequest>) -> Self {
        Self::ToolCalls {
            text: String::new(),
            calls,
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The decision
    pub reply: ModelReply,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls
/// `complete()` without knowing which provider is being used.
///
/// An `Err` means transport failure (unreachable, timed out, garbage back).
/// A model that declines to help still returns `Ok` with a final answer.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let json = serde_json::json!({
            "model": "gpt-4o",
            "system_prompt": "You are helpful.",
            "messages": []
        });
        let req: ProviderRequest = serde_json::from_value(json).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.tools.is_empty());
        assert!(req.max_tokens.is_none());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "web_search".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What to search for" }
                },
                "required": ["query"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("web_search"));
        assert!(json.contains("query"));
    }

    #[test]
    fn model_reply_constructors() {
        assert_eq!(
            ModelReply::answer("done"),
            ModelReply::FinalAnswer { text: "done".into() }
        );
        let reply = ModelReply::calls(vec![ToolCallRequest::new(
            "c1",
            "calculator",
            serde_json::json!({"expression": "1+1"}),
        )]);
        match reply {
            ModelReply::ToolCalls { text, calls } => {
                assert!(text.is_empty());
                assert_eq!(calls[0].tool_name, "calculator");
            }
            _ => panic!("expected tool calls"),
        }
    }
}
