//! Chat turn handling: provider selection and dispatch.

pub mod orchestrator;
pub mod provider;
pub mod templates;

pub use orchestrator::{ChatOrchestrator, ChatRequest};
pub use provider::{ProviderInfo, ProviderKind};
pub use templates::TemplateCache;
