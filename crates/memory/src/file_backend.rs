//! File-based memory backend. Persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded [`MemoryEntry`]. Entries are loaded once on
//! creation and appended to disk on every store, so recall reads never touch
//! the file.
//!
//! Storage location: `~/.handoff/memory/memories.jsonl`

use async_trait::async_trait;
use handoff_core::error::MemoryError;
use handoff_core::memory::{MemoryBackend, MemoryEntry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::DEFAULT_RECALL_LIMIT;
use crate::recall;

pub struct FileBackend {
    path: PathBuf,
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
    recall_limit: usize,
}

impl FileBackend {
    /// Open the store at `path`. A missing file starts empty and is created
    /// on first write. Corrupted lines are skipped.
    pub fn new(path: PathBuf) -> Self {
        let entries = load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "File memory backend loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
            recall_limit: DEFAULT_RECALL_LIMIT,
        }
    }

    /// Default path: `~/.handoff/memory/memories.jsonl`
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".handoff")
            .join("memory")
            .join("memories.jsonl")
    }

    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn append(&self, entry: &MemoryEntry) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let mut line = serde_json::to_string(entry)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory entry: {e}")))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open memory file: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))
    }
}

fn load_from_disk(path: &Path) -> Vec<MemoryEntry> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<MemoryEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping corrupted memory entry");
                None
            }
        })
        .collect()
}

#[async_trait]
impl MemoryBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
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
        // Hold the write lock across the append so lines land in store order.
        let mut entries = self.entries.write().await;
        self.append(&entry).await?;
        entries.push(entry);
        Ok(())
    }
}
