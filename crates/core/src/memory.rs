//! Memory trait: long-term recall across turns and sessions.
//!
//! A backend answers two questions: "what do I already know that is relevant
//! to this input?" (a text digest) and "remember this exchange". Both are
//! best-effort from the loop's point of view: a failing backend only means
//! the turn proceeds without recall.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A single remembered exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique ID for this memory
    pub id: String,

    /// Whose memory this is
    pub user_id: String,

    /// What the user said
    pub user_input: String,

    /// What the assistant answered
    pub assistant_response: String,

    /// When this memory was created
    pub created_at: DateTime<Utc>,

    /// Relevance score (set by retrieval)
    #[serde(default)]
    pub score: f32,
}

impl MemoryEntry {
    /// One line of digest text for this entry.
    pub fn digest_line(&self) -> String {
        format!(
            "- User said: {} | Assistant answered: {}",
            self.user_input.trim(),
            self.assistant_response.trim()
        )
    }
}

/// The core MemoryBackend trait.
///
/// Implementations: in-memory (keyword recall), none (no-op).
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// A digest of prior facts relevant to `text` for `user_id`, or `None`
    /// when nothing relevant is known.
    async fn retrieve(
        &self,
        text: &str,
        user_id: &str,
    ) -> std::result::Result<Option<String>, MemoryError>;

    /// Persist a completed exchange.
    async fn store(
        &self,
        user_input: &str,
        assistant_response: &str,
        user_id: &str,
    ) -> std::result::Result<(), MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_line_trims_both_sides() {
        let entry = MemoryEntry {
            id: "mem_001".into(),
            user_id: "alice".into(),
            user_input: "  I prefer Rust  ".into(),
            assistant_response: "Noted.\n".into(),
            created_at: Utc::now(),
            score: 0.0,
        };
        assert_eq!(
            entry.digest_line(),
            "- User said: I prefer Rust | Assistant answered: Noted."
        );
    }

    #[test]
    fn memory_entry_serialization() {
        let entry = MemoryEntry {
            id: "mem_002".into(),
            user_id: "alice".into(),
            user_input: "The user prefers Rust over C++".into(),
            assistant_response: "Got it".into(),
            created_at: Utc::now(),
            score: 0.95,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("Rust over C++"));
        assert!(json.contains("alice"));
    }
}
