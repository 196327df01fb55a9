//! Planner tool. Asks the model for a step-by-step plan over the other
//! registered tools and returns it as structured JSON.

use std::sync::Arc;

use async_trait::async_trait;
use handoff_core::error::ToolError;
use handoff_core::message::Message;
use handoff_core::provider::{ModelReply, Provider, ProviderRequest};
use handoff_core::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

const NAME: &str = "planner";

const SYSTEM_PROMPT: &str = "You are a meticulous planner. You break goals into small, \
concrete steps that each use exactly one tool. You answer with JSON only.";

/// One step of a plan. Arguments may reference earlier output with the
/// placeholder `{{result_of_step_N}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: u32,
    pub task: String,
    pub tool: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Deserialize)]
struct Plan {
    plan: Vec<PlanStep>,
}

pub struct PlannerTool {
    provider: Arc<dyn Provider>,
    model: String,
    /// `(name, description)` of every tool a plan may use.
    catalog: Vec<(String, String)>,
}

impl PlannerTool {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        catalog: Vec<(String, String)>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            catalog: catalog.into_iter().filter(|(name, _)| name != NAME).collect(),
        }
    }

    fn prompt(&self, goal: &str) -> String {
        let tools = self
            .catalog
            .iter()
            .map(|(name, description)| format!("- {name}: {description}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Create a detailed, step-by-step plan to achieve this goal: \"{goal}\"\n\n\
             Use only these tools:\n{tools}\n\n\
             Reply with a single JSON object with one key, \"plan\", holding an array of steps. \
             Each step has:\n\
             - \"step\": the step number, starting at 1\n\
             - \"task\": what this step does\n\
             - \"tool\": the exact name of the tool to use\n\
             - \"arguments\": a JSON object of arguments for the tool\n\n\
             If an argument depends on the output of an earlier step, use the placeholder \
             \"{{{{result_of_step_N}}}}\" where N is that step's number.\n\
             Do not add any text before or after the JSON."
        )
    }

    fn parse(&self, text: &str) -> Result<Vec<PlanStep>, ToolError> {
        let body = strip_code_fence(text);
        if body.is_empty() {
            return Err(ToolError::failed(NAME, "model returned an empty plan"));
        }
        let plan: Plan = serde_json::from_str(body).map_err(|e| {
            ToolError::failed(
                NAME,
                format!("plan must be a JSON object with a 'plan' array: {e}"),
            )
        })?;

        for step in &plan.plan {
            if !self.catalog.iter().any(|(name, _)| *name == step.tool) {
                return Err(ToolError::failed(
                    NAME,
                    format!("step {} uses unknown tool '{}'", step.step, step.tool),
                ));
            }
            if !step.arguments.is_object() {
                return Err(ToolError::failed(
                    NAME,
                    format!("step {} arguments must be an object", step.step),
                ));
            }
        }
        Ok(plan.plan)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[async_trait]
impl Tool for PlannerTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Create a step-by-step plan to achieve a goal. Use it first to break a complex task \
         into smaller steps, each naming the tool to use and its arguments."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goal": {
                    "type": "string",
                    "description": "The goal to be achieved"
                }
            },
            "required": ["goal"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let goal = arguments["goal"].as_str().unwrap_or_default().trim();
        if goal.is_empty() {
            return Err(ToolError::invalid(NAME, "goal must not be empty"));
        }

        let request = ProviderRequest {
            model: self.model.clone(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(0, NAME, self.prompt(goal))],
            tools: Vec::new(),
            temperature: 0.0,
            max_tokens: None,
        };
        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| ToolError::failed(NAME, e.to_string()))?;

        let text = match response.reply {
            ModelReply::FinalAnswer { text } | ModelReply::ToolCalls { text, .. } => text,
        };
        let steps = self.parse(&text)?;
        debug!(goal, steps = steps.len(), "Plan created");

        serde_json::to_value(steps).map_err(|e| ToolError::failed(NAME, e.to_string()))
    }
}
