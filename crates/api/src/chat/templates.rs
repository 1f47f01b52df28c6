//! Process-wide cache of the workflow template.

use std::path::{Path, PathBuf};

use assistant_core::template::{load_template, TemplateError};
use assistant_core::workflow::WorkflowGraph;
use tokio::sync::OnceCell;

/// Loads the workflow template on first use and keeps it for the life of
/// the process.
///
/// Only a successful load is cached. A missing file or a load error is
/// reported to the caller and retried on the next call, so a template
/// installed after startup is picked up without a restart.
#[derive(Debug)]
pub struct TemplateCache {
    path: PathBuf,
    graph: OnceCell<WorkflowGraph>,
}

impl TemplateCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            graph: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached template, loading it if needed. `Ok(None)` means the
    /// file does not exist.
    pub async fn get(&self) -> Result<Option<&WorkflowGraph>, TemplateError> {
        let loaded = self
            .graph
            .get_or_try_init(|| async {
                match load_template(&self.path).await {
                    Ok(Some(graph)) => Ok(graph),
                    Ok(None) => Err(None),
                    Err(e) => Err(Some(e)),
                }
            })
            .await;

        match loaded {
            Ok(graph) => Ok(Some(graph)),
            Err(None) => Ok(None),
            Err(Some(e)) => Err(e),
        }
    }

    /// Whether a usable template is available.
    pub async fn is_available(&self) -> bool {
        matches!(self.get().await, Ok(Some(_)))
    }
}
