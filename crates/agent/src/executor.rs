//! Tool executor: lookup, allowlist check, validation, isolated execution.
//!
//! The executor never decides control flow: every call, however it fails,
//! comes back as a [`ToolCallResult`] for the loop to append.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use handoff_core::error::ToolError;
use handoff_core::persona::PersonaContext;
use handoff_core::provider::ToolDefinition;
use handoff_core::schema::validate_arguments;
use handoff_core::tool::{ToolCallRequest, ToolCallResult, ToolErrorDetail, ToolRegistry};
use tracing::{debug, warn};

/// Runs tool calls on behalf of a persona.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn set_timeout(&mut self, timeout_secs: u64) {
        self.timeout = Duration::from_secs(timeout_secs);
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Definitions of the registered tools `persona` may call.
    pub fn definitions_for(&self, persona: &PersonaContext) -> Vec<ToolDefinition> {
        self.registry.definitions_where(|name| persona.allows(name))
    }

    /// Execute one call. Failures become `status=error` results.
    pub async fn execute(&self, persona: &PersonaContext, call: &ToolCallRequest) -> ToolCallResult {
        match self.try_execute(persona, call).await {
            Ok(payload) => {
                debug!(tool = %call.tool_name, call_id = %call.call_id, "Tool succeeded");
                ToolCallResult::ok(&call.call_id, payload)
            }
            Err(e) => {
                warn!(
                    tool = %call.tool_name,
                    call_id = %call.call_id,
                    persona = %persona.id,
                    error = %e,
                    "Tool call failed"
                );
                ToolCallResult::error(&call.call_id, ToolErrorDetail::from(&e))
            }
        }
    }

    async fn try_execute(
        &self,
        persona: &PersonaContext,
        call: &ToolCallRequest,
    ) -> Result<serde_json::Value, ToolError> {
        let name = call.tool_name.as_str();

        // A tool outside the allowlist does not exist as far as this persona is concerned.
        if !persona.allows(name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        validate_arguments(&tool.input_schema(), &call.arguments)
            .map_err(|reason| ToolError::invalid(name, reason))?;

        let run = AssertUnwindSafe(tool.execute(call.arguments.clone())).catch_unwind();
        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => Err(ToolError::Timeout {
                tool_name: name.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
            Ok(Err(panic)) => Err(ToolError::Panicked {
                tool_name: name.to_string(),
                reason: panic_message(panic.as_ref()),
            }),
            Ok(Ok(result)) => result,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoTool, FailingTool, PanickingTool, SlowTool, call};
    use serde_json::json;

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(FailingTool));
        registry.register(Box::new(PanickingTool));
        registry.register(Box::new(SlowTool::new(Duration::from_secs(5))));
        ToolExecutor::new(Arc::new(registry), 1)
    }

    fn anyone() -> PersonaContext {
        PersonaContext::new("default", "You are helpful.")
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let result = executor()
            .execute(&anyone(), &call("c1", "echo", json!({"text": "hi"})))
            .await;
        assert!(result.is_ok());
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.render(), "hi");
    }

    #[tokio::test]
    async fn unregistered_tool_is_unknown() {
        let result = executor()
            .execute(&anyone(), &call("c1", "teleport", json!({})))
            .await;
        assert_eq!(result.error_detail().unwrap().kind, "unknown_tool");
    }

    #[tokio::test]
    async fn tool_outside_allowlist_is_unknown() {
        let persona = anyone().with_tools(["failing"]);
        let result = executor()
            .execute(&persona, &call("c1", "echo", json!({"text": "hi"})))
            .await;
        assert_eq!(result.error_detail().unwrap().kind, "unknown_tool");
    }

    #[tokio::test]
    async fn schema_violation_is_invalid_arguments() {
        let result = executor()
            .execute(&anyone(), &call("c1", "echo", json!({"text": 7})))
            .await;
        let detail = result.error_detail().unwrap();
        assert_eq!(detail.kind, "invalid_arguments");
        assert!(detail.message.contains("'text'"));
    }

    #[tokio::test]
    async fn tool_error_is_captured() {
        let result = executor()
            .execute(&anyone(), &call("c1", "failing", json!({})))
            .await;
        assert_eq!(result.error_detail().unwrap().kind, "execution_failed");
    }

    #[tokio::test]
    async fn tool_panic_is_captured() {
        let result = executor()
            .execute(&anyone(), &call("c1", "panicking", json!({})))
            .await;
        let detail = result.error_detail().unwrap();
        assert_eq!(detail.kind, "panicked");
        assert!(detail.message.contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let result = executor()
            .execute(&anyone(), &call("c1", "slow", json!({})))
            .await;
        assert_eq!(result.error_detail().unwrap().kind, "timeout");
    }

    #[test]
    fn definitions_respect_allowlist() {
        let exec = executor();
        let persona = anyone().with_tools(["echo", "slow"]);
        let names: Vec<String> = exec
            .definitions_for(&persona)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["echo", "slow"]);
    }
}
