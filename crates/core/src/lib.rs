//! # handoff core
//!
//! Domain types, traits, and error definitions for the handoff agent runtime.
//! This crate has **no runtime dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model, memory, observability, tools) is a
//! trait here. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted and fault-injected stubs
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod memory;
pub mod message;
pub mod observe;
pub mod persona;
pub mod provider;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::TurnLimits;
pub use error::{Error, MemoryError, ObservabilityError, ProviderError, Result, ToolError, TurnError};
pub use memory::{MemoryBackend, MemoryEntry};
pub use message::{ConversationHistory, Message, MessageContent, Role, SequenceClock};
pub use observe::{
    ModelCallRecord, NoopSink, ObservabilitySink, RequestEnd, RequestOutcome, RequestStart,
    ToolCallRecord,
};
pub use persona::{PersonaContext, PersonaRegistry};
pub use provider::{ModelReply, Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCallRequest, ToolCallResult, ToolErrorDetail, ToolOutcome, ToolRegistry};
