//! Message and ConversationHistory domain types.
//!
//! A history is an append-only log of messages, each stamped with a
//! session-wide sequence index and the persona that produced or received it:
//! User sends input → Agent asks the model → Model requests tools → Tool
//! results are appended → Model answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::tool::{ToolCallRequest, ToolCallResult};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user (or the delegating persona, for a seeded sub-task)
    User,
    /// The model speaking for a persona
    Assistant,
    /// Tool execution result
    Tool,
}

/// What a message carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text (user input or a final answer).
    Text { text: String },

    /// An assistant turn that requests tool invocations.
    /// `text` is whatever prose the model emitted alongside the calls.
    ToolCalls {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        text: String,
        calls: Vec<ToolCallRequest>,
    },

    /// The outcome of exactly one tool call.
    ToolResult { result: ToolCallResult },
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic, session-wide ordering index
    pub sequence: u64,

    /// Who sent this message
    pub role: Role,

    /// Persona that produced (assistant/tool) or received (user) the message
    pub persona_id: String,

    /// The payload
    pub content: MessageContent,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a user message.
    pub fn user(sequence: u64, persona_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(sequence, Role::User, persona_id, MessageContent::Text { text: text.into() })
    }

    /// Create an assistant message carrying a final answer.
    pub fn assistant(sequence: u64, persona_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            sequence,
            Role::Assistant,
            persona_id,
            MessageContent::Text { text: text.into() },
        )
    }

    /// Create an assistant message requesting tool calls.
    pub fn tool_calls(
        sequence: u64,
        persona_id: impl Into<String>,
        text: impl Into<String>,
        calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self::new(
            sequence,
            Role::Assistant,
            persona_id,
            MessageContent::ToolCalls {
                text: text.into(),
                calls,
            },
        )
    }

    /// Create a tool result message.
    pub fn tool_result(sequence: u64, persona_id: impl Into<String>, result: ToolCallResult) -> Self {
        Self::new(sequence, Role::Tool, persona_id, MessageContent::ToolResult { result })
    }

    fn new(sequence: u64, role: Role, persona_id: impl Into<String>, content: MessageContent) -> Self {
        Self {
            sequence,
            role,
            persona_id: persona_id.into(),
            content,
            timestamp: Utc::now(),
        }
    }

    /// The text of a user message or final answer, or the prose that came
    /// with a tool-call request.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::ToolCalls { text, .. } => Some(text),
            MessageContent::ToolResult { .. } => None,
        }
    }

    /// Tool calls requested by this message (empty unless an assistant
    /// tool-call message).
    pub fn tool_calls_requested(&self) -> &[ToolCallRequest] {
        match &self.content {
            MessageContent::ToolCalls { calls, .. } => calls,
            _ => &[],
        }
    }

    /// The tool result carried by this message, if any.
    pub fn result(&self) -> Option<&ToolCallResult> {
        match &self.content {
            MessageContent::ToolResult { result } => Some(result),
            _ => None,
        }
    }
}

/// Hands out sequence indices for one session.
///
/// Clones share the same counter, so a delegated sub-history keeps stamping
/// indices that are strictly greater than anything the caller has seen.
#[derive(Debug, Clone, Default)]
pub struct SequenceClock(Arc<AtomicU64>);

impl SequenceClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next index, starting at 1. Never returns the same value twice.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The last index handed out (0 if none).
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// An ordered, append-only log of messages owned by one loop instance.
///
/// Messages are never mutated once appended; the only way to remove them is
/// [`ConversationHistory::reset`], which clears the whole log but never
/// rewinds the sequence clock.
#[derive(Debug)]
pub struct ConversationHistory {
    id: String,
    clock: SequenceClock,
    messages: Vec<Message>,
    /// Highest index ever appended, kept across resets.
    last_sequence: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationHistory {
    /// Create an empty history with its own clock.
    pub fn new() -> Self {
        Self::with_clock(SequenceClock::new())
    }

    /// Create an empty history that stamps indices from `clock`.
    pub fn with_clock(clock: SequenceClock) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            last_sequence: clock.current(),
            clock,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A new, independent, empty history sharing this history's clock.
    ///
    /// Used for delegated sub-turns: the callee sees none of the caller's
    /// messages, but indices remain strictly increasing session-wide.
    pub fn derive(&self) -> Self {
        Self::with_clock(self.clock.clone())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The clock this history stamps messages from.
    pub fn clock(&self) -> &SequenceClock {
        &self.clock
    }

    /// Append a fully formed message.
    ///
    /// # Panics
    ///
    /// Panics if `message.sequence` is not strictly greater than every index
    /// previously appended to this history. That is a broken invariant in the
    /// caller, not a runtime condition.
    pub fn append(&mut self, message: Message) {
        assert!(
            message.sequence > self.last_sequence,
            "conversation {}: sequence index {} is not greater than last appended index {}",
            self.id,
            message.sequence,
            self.last_sequence
        );
        self.last_sequence = message.sequence;
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Append a user message stamped with the next index.
    pub fn push_user(&mut self, persona_id: &str, text: impl Into<String>) -> u64 {
        let seq = self.clock.next();
        self.append(Message::user(seq, persona_id, text));
        seq
    }

    /// Append a final-answer assistant message stamped with the next index.
    pub fn push_assistant(&mut self, persona_id: &str, text: impl Into<String>) -> u64 {
        let seq = self.clock.next();
        self.append(Message::assistant(seq, persona_id, text));
        seq
    }

    /// Append an assistant tool-call message stamped with the next index.
    pub fn push_tool_calls(
        &mut self,
        persona_id: &str,
        text: impl Into<String>,
        calls: Vec<ToolCallRequest>,
    ) -> u64 {
        let seq = self.clock.next();
        self.append(Message::tool_calls(seq, persona_id, text, calls));
        seq
    }

    /// Append a tool result stamped with the next index.
    pub fn push_tool_result(&mut self, persona_id: &str, result: ToolCallResult) -> u64 {
        let seq = self.clock.next();
        self.append(Message::tool_result(seq, persona_id, result));
        seq
    }

    /// Borrow the ordered messages.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// An owned copy of the ordered messages.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Clear all messages. The clock is not rewound.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }

    /// Call ids of the most recent tool-call message that have no matching
    /// result yet. Empty when the history is well formed.
    pub fn unanswered_calls(&self) -> Vec<&str> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| !m.tool_calls_requested().is_empty())
        else {
            return Vec::new();
        };

        let answered: Vec<&str> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| m.result())
            .map(|r| r.call_id.as_str())
            .collect();

        self.messages[pos]
            .tool_calls_requested()
            .iter()
            .map(|c| c.call_id.as_str())
            .filter(|id| !answered.contains(id))
            .collect()
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| match &m.content {
                MessageContent::Text { text } => text.len(),
                MessageContent::ToolCalls { text, calls } => {
                    text.len() + calls.iter().map(|c| c.arguments.to_string().len()).sum::<usize>()
                }
                MessageContent::ToolResult { result } => result.render().len(),
            })
            .sum::<usize>()
            / 4
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
