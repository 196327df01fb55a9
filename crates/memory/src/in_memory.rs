//! In-memory backend. Fast, process-local, lost on exit.

use async_trait::async_trait;
use handoff_core::error::MemoryError;
use handoff_core::memory::{MemoryBackend, MemoryEntry};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::DEFAULT_RECALL_LIMIT;
use crate::recall;

/// Keeps every exchange in a vector and recalls by keyword overlap.
pub struct InMemoryBackend {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
    recall_limit: usize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            recall_limit: DEFAULT_RECALL_LIMIT,
        }
    }

    /// Cap the number of entries a digest holds.
    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit.max(1);
        self
    }

    /// Number of stored exchanges, across all users.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn retrieve(&self, text: &str, user_id: &str) -> Result<Option<String>, MemoryError> {
        let entries = self.entries.read().await;
        let ranked = recall::rank(&entries, text, user_id, self.recall_limit);
        debug!(user_id, hits = ranked.len(), "Memory recall");
        Ok(recall::digest(&ranked))
    }

    async fn store(
        &self,
        user_input: &str,
        assistant_response: &str,
        user_id: &str,
    ) -> Result<(), MemoryError> {
        let entry = recall::new_entry(user_input, assistant_response, user_id);
        self.entries.write().await.push(entry);
        Ok(())
    }
}
