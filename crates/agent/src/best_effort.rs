//! Guards around collaborators whose failure must never fail a turn.
//!
//! Memory errors and timeouts degrade to "no memory"; sink errors are logged
//! and dropped.

use std::sync::Arc;
use std::time::Duration;

use handoff_core::memory::MemoryBackend;
use handoff_core::observe::{
    ModelCallRecord, ObservabilitySink, RequestEnd, RequestStart, ToolCallRecord,
};
use tracing::{debug, warn};

pub(crate) struct MemoryGuard {
    backend: Option<Arc<dyn MemoryBackend>>,
    timeout: Duration,
}

impl MemoryGuard {
    pub(crate) fn new(backend: Option<Arc<dyn MemoryBackend>>, timeout_secs: u64) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub(crate) fn set_timeout(&mut self, timeout_secs: u64) {
        self.timeout = Duration::from_secs(timeout_secs);
    }

    /// A digest for `text`, or `None` on miss, error or timeout.
    pub(crate) async fn retrieve(&self, text: &str, user_id: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;

        match tokio::time::timeout(self.timeout, backend.retrieve(text, user_id)).await {
            Ok(Ok(Some(digest))) if !digest.trim().is_empty() => {
                debug!(backend = backend.name(), "Recalled memory digest");
                Some(digest)
            }
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(backend = backend.name(), "Memory recall failed: {e}");
                None
            }
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Memory recall timed out"
                );
                None
            }
        }
    }

    /// Persist an exchange in the background. The caller never waits.
    pub(crate) fn store_detached(&self, user_input: &str, answer: &str, user_id: &str) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let timeout = self.timeout;
        let (user_input, answer, user_id) =
            (user_input.to_string(), answer.to_string(), user_id.to_string());

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, backend.store(&user_input, &answer, &user_id)).await
            {
                Ok(Ok(())) => debug!(backend = backend.name(), "Auto-saved exchange to memory"),
                Ok(Err(e)) => warn!(backend = backend.name(), "Failed to auto-save to memory: {e}"),
                Err(_) => warn!(backend = backend.name(), "Memory store timed out"),
            }
        });
    }
}

pub(crate) struct ObserverGuard {
    sink: Arc<dyn ObservabilitySink>,
}

impl ObserverGuard {
    pub(crate) fn new(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self { sink }
    }

    pub(crate) fn request_start(&self, event: &RequestStart) {
        self.swallow("request_start", self.sink.on_request_start(event));
    }

    pub(crate) fn model_call(&self, event: &ModelCallRecord) {
        self.swallow("model_call", self.sink.on_model_call(event));
    }

    pub(crate) fn tool_call(&self, event: &ToolCallRecord) {
        self.swallow("tool_call", self.sink.on_tool_call(event));
    }

    pub(crate) fn request_end(&self, event: &RequestEnd) {
        self.swallow("request_end", self.sink.on_request_end(event));
    }

    pub(crate) fn flush(&self) {
        self.swallow("flush", self.sink.flush());
    }

    fn swallow(&self, event: &str, result: Result<(), handoff_core::ObservabilityError>) {
        if let Err(e) = result {
            warn!(sink = self.sink.name(), event, "Observability sink failed: {e}");
        }
    }
}
