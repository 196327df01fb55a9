//! Error types for the handoff domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`TurnError`] is the set of
//! conditions that end a turn without an answer.

use thiserror::Error;

/// The top-level error type for all handoff operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Turn errors ---
    #[error("Turn failed: {0}")]
    Turn(#[from] TurnError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Transport-level failures of the Model Gateway.
///
/// Every variant means "the model could not be reached or answered garbage";
/// a well-formed refusal from the model is a normal final answer, not an error.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Memory operation timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool panicked: {tool_name}: {reason}")]
    Panicked { tool_name: String, reason: String },
}

impl ToolError {
    /// Shorthand used by tool implementations.
    pub fn failed(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand used by tool implementations and the schema validator.
    pub fn invalid(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("Observability sink '{sink}' failed: {reason}")]
pub struct ObservabilityError {
    pub sink: String,
    pub reason: String,
}

/// Conditions that terminate a turn without a final answer.
///
/// The session and its history stay usable; the next turn may proceed.
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] ProviderError),

    #[error("Turn for persona '{persona}' exceeded {max_iterations} model iterations without a final answer")]
    TurnLimitExceeded { persona: String, max_iterations: u32 },

    #[error("Delegation from '{caller}' to '{callee}' would reach depth {depth}, limit is {max_depth}")]
    DelegationDepthExceeded {
        caller: String,
        callee: String,
        depth: u32,
        max_depth: u32,
    },

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("Turn cancelled")]
    Cancelled,
}

impl TurnError {
    /// Stable snake_case name, used in tool-result error details and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::TurnLimitExceeded { .. } => "turn_limit_exceeded",
            Self::DelegationDepthExceeded { .. } => "delegation_depth_exceeded",
            Self::UnknownPersona(_) => "unknown_persona",
            Self::Cancelled => "cancelled",
        }
    }
}
