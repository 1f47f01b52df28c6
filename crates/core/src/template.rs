//! Workflow template loading.
//!
//! The template is a static JSON file installed next to the executable.
//! A missing file is not an error: it means image generation is
//! unavailable. Anything else that goes wrong while reading or parsing
//! is reported as [`TemplateError::Load`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::workflow::WorkflowGraph;

/// File name of the bundled workflow template.
pub const DEFAULT_TEMPLATE_FILE: &str = "comfy_workflow.json";

/// Errors from reading or parsing a workflow template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The file exists but could not be read.
    #[error("Error loading workflow {path}: {message}")]
    Load { path: String, message: String },
}

/// Default template location: [`DEFAULT_TEMPLATE_FILE`] in the directory
/// containing the running executable, falling back to the working directory
/// when the executable path cannot be resolved.
pub fn default_template_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_TEMPLATE_FILE)
}

/// Load and parse the workflow template at `path`.
///
/// Returns `Ok(None)` when the file does not exist.
pub async fn load_template(path: &Path) -> Result<Option<WorkflowGraph>, TemplateError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Workflow template not found");
            return Ok(None);
        }
        Err(e) => {
            return Err(TemplateError::Load {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        }
    };

    let graph = WorkflowGraph::from_json_str(&text).map_err(|e| TemplateError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    tracing::info!(path = %path.display(), nodes = graph.len(), "Loaded workflow template");
    Ok(Some(graph))
}
