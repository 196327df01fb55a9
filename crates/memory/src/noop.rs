//! No-op memory backend. Disables recall entirely.

use async_trait::async_trait;
use handoff_core::error::MemoryError;
use handoff_core::memory::MemoryBackend;

/// A memory backend that stores nothing and recalls nothing.
pub struct NoopMemory;

#[async_trait]
impl MemoryBackend for NoopMemory {
    fn name(&self) -> &str {
        "none"
    }

    async fn retrieve(&self, _text: &str, _user_id: &str) -> Result<Option<String>, MemoryError> {
        Ok(None)
    }

    async fn store(&self, _input: &str, _answer: &str, _user_id: &str) -> Result<(), MemoryError> {
        Ok(())
    }
}
