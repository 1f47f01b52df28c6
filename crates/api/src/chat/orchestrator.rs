//! Dispatch of a chat turn to the selected provider.
//!
//! Provider failures never propagate as errors: each one becomes an
//! assistant message the user can read. Only a malformed request (for
//! example out-of-range image settings) is rejected before dispatch.

use assistant_comfyui::generation::{GenerationClient, GenerationError};
use assistant_core::chat::ChatMessage;
use assistant_core::error::CoreError;
use assistant_core::generation::{GenerationParameters, ImageSettings};
use assistant_core::template::TemplateError;
use assistant_core::workflow::inject;
use assistant_gemini::GeminiClient;
use serde::Deserialize;

use crate::chat::provider::{ProviderInfo, ProviderKind};
use crate::chat::templates::TemplateCache;
use crate::config::ServerConfig;

pub const MISSING_GEMINI_KEY: &str =
    "⚠️ No Gemini API key found. Add GEMINI_API_KEY to .env file.";

/// Appended to image failures that may succeed on a second attempt.
pub const RETRY_HINT: &str = "The job may still be running, please try again.";

/// One user turn.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub provider: ProviderKind,
    pub content: String,
    /// ComfyUI instance for this turn; the configured default when absent.
    #[serde(default)]
    pub comfyui_url: Option<String>,
    /// Image overrides; ignored by text providers.
    #[serde(default)]
    pub image: ImageSettings,
}

/// Reasons an image turn produced no image.
#[derive(Debug, thiserror::Error)]
enum ImageError {
    #[error("No workflow file found")]
    NoTemplate,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl ImageError {
    fn is_retryable(&self) -> bool {
        matches!(self, ImageError::Generation(e) if e.is_retryable())
    }
}

/// Routes chat turns to the echo, Gemini and image providers.
#[derive(Debug)]
pub struct ChatOrchestrator {
    gemini: Option<GeminiClient>,
    generation: GenerationClient,
    templates: TemplateCache,
    default_comfyui_url: String,
}

impl ChatOrchestrator {
    pub fn new(
        gemini: Option<GeminiClient>,
        generation: GenerationClient,
        templates: TemplateCache,
        default_comfyui_url: impl Into<String>,
    ) -> Self {
        Self {
            gemini,
            generation,
            templates,
            default_comfyui_url: default_comfyui_url.into(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.gemini_config().map(GeminiClient::new),
            GenerationClient::new(config.poll_config()),
            TemplateCache::new(config.workflow_path.clone()),
            config.comfyui_url.clone(),
        )
    }

    pub fn generation_client(&self) -> &GenerationClient {
        &self.generation
    }

    pub fn default_comfyui_url(&self) -> &str {
        &self.default_comfyui_url
    }

    /// Resolve the ComfyUI instance for a turn or probe.
    pub fn comfyui_url<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(self.default_comfyui_url.as_str())
    }

    /// Every provider with its readiness.
    pub async fn providers(&self) -> Vec<ProviderInfo> {
        let template_ready = self.templates.is_available().await;

        ProviderKind::ALL
            .iter()
            .map(|&kind| match kind {
                ProviderKind::Echo => ProviderInfo::new(kind, true),
                ProviderKind::Gemini => {
                    let mut info = ProviderInfo::new(kind, self.gemini.is_some());
                    if self.gemini.is_none() {
                        info.hint = Some("Add GEMINI_API_KEY to .env file".into());
                    }
                    info
                }
                ProviderKind::Image => {
                    let mut info = ProviderInfo::new(kind, template_ready);
                    if !template_ready {
                        info.hint = Some(format!(
                            "No workflow file found at {}",
                            self.templates.path().display()
                        ));
                    }
                    info.comfyui_url = Some(self.default_comfyui_url.clone());
                    info
                }
            })
            .collect()
    }

    /// Produce the assistant reply for `request` given the prior `history`.
    ///
    /// `history` must not yet contain the current user message.
    pub async fn respond(
        &self,
        history: &[ChatMessage],
        request: &ChatRequest,
    ) -> Result<ChatMessage, CoreError> {
        let input = request.content.trim();

        let reply = match request.provider {
            ProviderKind::Echo => ChatMessage::assistant(format!("You said: **{input}**")),
            ProviderKind::Gemini => self.gemini_reply(history, input).await,
            ProviderKind::Image => {
                let params = request.image.resolve(input)?;
                let base_url = self.comfyui_url(request.comfyui_url.as_deref());
                self.image_reply(base_url, &params).await
            }
        };

        Ok(reply)
    }

    async fn gemini_reply(&self, history: &[ChatMessage], input: &str) -> ChatMessage {
        let Some(client) = &self.gemini else {
            return ChatMessage::assistant(MISSING_GEMINI_KEY);
        };

        match client.generate(history, input).await {
            Ok(text) => ChatMessage::assistant(text),
            Err(e) => {
                tracing::warn!(error = %e, model = client.model(), "Gemini reply failed");
                ChatMessage::assistant(format!("⚠️ {e}"))
            }
        }
    }

    async fn image_reply(&self, base_url: &str, params: &GenerationParameters) -> ChatMessage {
        let reply = ChatMessage::assistant(format!(
            "I'll generate an image for you: **{}**",
            params.prompt_text
        ));

        match self.generate_image(base_url, params).await {
            Ok(url) => reply.with_image_url(url),
            Err(e) => {
                let retryable = e.is_retryable();
                tracing::warn!(
                    error = %e,
                    comfyui_url = base_url,
                    retryable,
                    "Image generation failed",
                );
                if retryable {
                    reply.with_error(format!("Image generation failed: {e}. {RETRY_HINT}"))
                } else {
                    reply.with_error(format!("Image generation failed: {e}"))
                }
            }
        }
    }

    async fn generate_image(
        &self,
        base_url: &str,
        params: &GenerationParameters,
    ) -> Result<String, ImageError> {
        let template = self.templates.get().await?.ok_or(ImageError::NoTemplate)?;
        let graph = inject(template, params);

        tracing::info!(
            comfyui_url = base_url,
            seed = params.seed,
            width = params.width,
            height = params.height,
            "Submitting image generation",
        );
        Ok(self.generation.generate(base_url, &graph).await?)
    }
}
