//! File write tool. Writes markdown files under a workspace directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use handoff_core::error::ToolError;
use handoff_core::tool::Tool;
use serde_json::{Value, json};
use tracing::info;

const NAME: &str = "file_write";

pub struct FileWriteTool {
    workspace_dir: PathBuf,
}

impl FileWriteTool {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
        }
    }

    /// Resolve `filename` inside the workspace. Only relative `.md` paths
    /// without `..` are accepted.
    fn resolve(&self, filename: &str) -> Result<PathBuf, ToolError> {
        let relative = Path::new(filename);
        if relative.extension().and_then(|e| e.to_str()) != Some("md") {
            return Err(ToolError::invalid(NAME, "filename must end with .md"));
        }
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ToolError::invalid(
                NAME,
                "filename must be a relative path inside the workspace",
            ));
        }
        Ok(self.workspace_dir.join(relative))
    }

    /// Canonicalize the target so symlinks inside the workspace cannot
    /// redirect the write outside of it. Checks the nearest existing
    /// ancestor first so no directory is created outside the workspace.
    async fn confine(&self, path: &Path) -> Result<PathBuf, ToolError> {
        tokio::fs::create_dir_all(&self.workspace_dir)
            .await
            .map_err(|e| ToolError::failed(NAME, format!("Failed to create workspace: {e}")))?;
        let root = canonical(&self.workspace_dir).await?;
        for ancestor in path.ancestors().skip(1) {
            if tokio::fs::try_exists(ancestor).await.unwrap_or(false) {
                ensure_inside(&canonical(ancestor).await?, &root)?;
                break;
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::failed(NAME, format!("Failed to create directory: {e}")))?;
        }

        let mut target = canonical(path.parent().unwrap_or(&self.workspace_dir)).await?;
        if let Some(file_name) = path.file_name() {
            target.push(file_name);
        }
        if let Ok(meta) = tokio::fs::symlink_metadata(&target).await
            && meta.file_type().is_symlink()
        {
            target = tokio::fs::canonicalize(&target).await.map_err(|_| {
                ToolError::invalid(NAME, "filename is a symlink that cannot be resolved")
            })?;
        }
        ensure_inside(&target, &root)?;
        Ok(target)
    }
}

async fn canonical(path: &Path) -> Result<PathBuf, ToolError> {
    tokio::fs::canonicalize(path)
        .await
        .map_err(|e| ToolError::failed(NAME, format!("Failed to resolve {}: {e}", path.display())))
}

fn ensure_inside(path: &Path, root: &Path) -> Result<(), ToolError> {
    if path.starts_with(root) {
        Ok(())
    } else {
        Err(ToolError::invalid(
            NAME,
            "filename resolves outside the workspace",
        ))
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Write content (summaries, plans, notes) to a markdown file in the workspace, \
         creating the file if it doesn't exist and overwriting it if it does."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Relative name of the markdown file, e.g. 'notes/plan.md'"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["filename", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let filename = arguments["filename"].as_str().unwrap_or_default();
        let content = arguments["content"].as_str().unwrap_or_default();
        let path = self.resolve(filename)?;

        let path = self.confine(&path).await?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::failed(NAME, format!("Failed to write file: {e}")))?;

        info!(path = %path.display(), bytes = content.len(), "Wrote file");
        Ok(Value::String(format!(
            "Successfully wrote {} bytes to {filename}",
            content.len()
        )))
    }
}
