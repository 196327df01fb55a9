//! Delegation: handing a sub-task to another persona.
//!
//! The `delegate` tool is not a registered tool: the loop intercepts it and
//! runs a nested turn under the callee persona in a fresh history seeded
//! with only the task. The callee's final answer comes back to the caller as
//! the payload of an ordinary tool result.

use serde::Deserialize;
use serde_json::json;

use handoff_core::persona::PersonaRegistry;
use handoff_core::provider::ToolDefinition;
use handoff_core::schema::validate_arguments;

/// Name the model uses to request a hand-off.
pub const DELEGATE_TOOL_NAME: &str = "delegate";

/// Transient record of one hand-off, alive for the duration of the callee's turn.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegationFrame {
    pub caller: String,
    pub callee: String,
    pub task: String,
    /// Depth of the callee's turn (1 for a hand-off from the user's turn).
    pub depth: u32,
    /// The callee's final answer, once it has one.
    pub result: Option<String>,
}

impl DelegationFrame {
    pub(crate) fn new(caller: &str, callee: &str, task: &str, depth: u32) -> Self {
        Self {
            caller: caller.to_string(),
            callee: callee.to_string(),
            task: task.to_string(),
            depth,
            result: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DelegateArgs {
    pub callee: String,
    pub task: String,
}

impl DelegateArgs {
    /// Validate and decode the model-supplied arguments.
    pub(crate) fn parse(arguments: &serde_json::Value) -> Result<Self, String> {
        validate_arguments(&schema(None), arguments)?;
        let args: Self = serde_json::from_value(arguments.clone()).map_err(|e| e.to_string())?;
        if args.task.trim().is_empty() {
            return Err("'task' must not be empty".into());
        }
        Ok(args)
    }
}

fn schema(callees: Option<Vec<&str>>) -> serde_json::Value {
    let mut callee = json!({
        "type": "string",
        "description": "Id of the persona that should handle the task"
    });
    if let Some(ids) = callees {
        callee["enum"] = json!(ids);
    }

    json!({
        "type": "object",
        "properties": {
            "callee": callee,
            "task": {
                "type": "string",
                "description": "A complete, self-contained description of the task. The other persona sees nothing else."
            }
        },
        "required": ["callee", "task"],
        "additionalProperties": false
    })
}

/// The `delegate` tool as advertised to `caller_id`, listing every other persona.
pub(crate) fn definition(personas: &PersonaRegistry, caller_id: &str) -> ToolDefinition {
    let mut description = String::from(
        "Hand a sub-task to another persona and receive its final answer. \
         Available personas:",
    );
    let mut ids = Vec::new();
    for persona in personas.others(caller_id) {
        ids.push(persona.id.as_str());
        if persona.description.is_empty() {
            description.push_str(&format!("\n- {}", persona.id));
        } else {
            description.push_str(&format!("\n- {}: {}", persona.id, persona.description));
        }
    }

    ToolDefinition {
        name: DELEGATE_TOOL_NAME.to_string(),
        description,
        parameters: schema(Some(ids)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::persona::PersonaContext;

    #[test]
    fn definition_lists_other_personas() {
        let personas = PersonaRegistry::new(
            vec![
                PersonaContext::new("planner", "p"),
                PersonaContext::new("joke_writer", "j").with_description("Writes jokes"),
                PersonaContext::new("researcher", "r"),
            ],
            "planner",
        )
        .unwrap();

        let def = definition(&personas, "planner");
        assert_eq!(def.name, "delegate");
        assert!(def.description.contains("- joke_writer: Writes jokes"));
        assert!(def.description.contains("- researcher"));
        assert!(!def.description.contains("- planner"));
        assert_eq!(
            def.parameters["properties"]["callee"]["enum"],
            json!(["joke_writer", "researcher"])
        );
    }

    #[test]
    fn parses_valid_arguments() {
        let args =
            DelegateArgs::parse(&json!({"callee": "joke_writer", "task": "a cat joke"})).unwrap();
        assert_eq!(args.callee, "joke_writer");
        assert_eq!(args.task, "a cat joke");
    }

    #[test]
    fn rejects_missing_task_and_blank_task() {
        let err = DelegateArgs::parse(&json!({"callee": "joke_writer"})).unwrap_err();
        assert!(err.contains("'task'"));

        let err = DelegateArgs::parse(&json!({"callee": "joke_writer", "task": "  "})).unwrap_err();
        assert!(err.contains("must not be empty"));
    }

    #[test]
    fn unknown_callee_passes_validation() {
        // Resolution happens later and reports unknown_persona.
        assert!(DelegateArgs::parse(&json!({"callee": "ghost", "task": "boo"})).is_ok());
    }
}
