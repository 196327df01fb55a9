//! Built-in tool implementations for handoff.
//!
//! Tools give a persona the ability to act: plan a task, do arithmetic,
//! search the web, and write markdown notes into a workspace directory.

pub mod calculator;
pub mod file_write;
pub mod planner;
pub mod web_search;

use std::path::PathBuf;
use std::sync::Arc;

use handoff_core::provider::Provider;
use handoff_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use file_write::FileWriteTool;
pub use planner::PlannerTool;
pub use web_search::WebSearchTool;

/// Settings the built-in tools need from the outside world.
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    /// Root directory `file_write` writes under.
    pub workspace_dir: PathBuf,
    /// Tavily key for `web_search`. Without one the tool reports an error
    /// on every call.
    pub tavily_api_key: Option<String>,
}

/// Create a registry holding every built-in tool.
pub fn default_registry(options: &ToolOptions) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool));
    registry.register(Box::new(WebSearchTool::new(options.tavily_api_key.clone())));
    registry.register(Box::new(FileWriteTool::new(options.workspace_dir.clone())));
    registry
}

/// Add the `planner` tool, which plans over every tool already in
/// `registry` using `provider`.
pub fn register_planner(
    registry: &mut ToolRegistry,
    provider: Arc<dyn Provider>,
    model: impl Into<String>,
) {
    let catalog = registry
        .definitions()
        .into_iter()
        .map(|d| (d.name, d.description))
        .collect();
    registry.register(Box::new(PlannerTool::new(provider, model, catalog)));
}
