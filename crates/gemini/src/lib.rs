//! Client for the Gemini `generateContent` REST endpoint.
//!
//! Sends a rolling window of the conversation transcript plus the new user
//! message and returns the model's text reply. Every failure maps to a
//! fixed, user-presentable [`GeminiError`].

use std::time::Duration;

use assistant_core::chat::{recent, ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// Public Gemini REST API base.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Number of prior transcript messages sent as context.
pub const HISTORY_WINDOW: usize = 10;

/// Timeout for one `generateContent` call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 1000;
const MAX_DIAGNOSTIC_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Gemini failures, each rendered as a fixed user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeminiError {
    #[error("Invalid request to Gemini API.")]
    InvalidRequest,

    #[error("Gemini API access denied. Check your API key.")]
    AccessDenied,

    #[error("Gemini API error ({0})")]
    Status(u16),

    #[error("Failed to call Gemini API: {0}")]
    Transport(String),

    #[error("No response from Gemini.")]
    NoCandidates,

    #[error("Empty response from Gemini.")]
    EmptyResponse,
}

impl GeminiError {
    fn from_status(status: u16) -> Self {
        match status {
            400 => GeminiError::InvalidRequest,
            403 => GeminiError::AccessDenied,
            other => GeminiError::Status(other),
        }
    }

    fn transport(err: impl std::fmt::Display) -> Self {
        GeminiError::Transport(err.to_string().chars().take(MAX_DIAGNOSTIC_CHARS).collect())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Connection settings for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    /// Settings for the public endpoint and default model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// HTTP client for one Gemini model.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Ask the model to reply to `message` given the prior `history`.
    ///
    /// Only the last [`HISTORY_WINDOW`] history messages are sent.
    pub async fn generate(
        &self,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<String, GeminiError> {
        let body = GenerateContentRequest {
            contents: build_contents(history, message),
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                tracing::warn!(error = %e, "Gemini request failed");
                GeminiError::transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Gemini returned an error status");
            return Err(GeminiError::from_status(status.as_u16()));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::transport(e.without_url()))?;

        extract_text(parsed)
    }
}

/// Build the `contents` array: the recent history window followed by the
/// new user message. Assistant turns use Gemini's `model` role.
pub fn build_contents(history: &[ChatMessage], message: &str) -> Vec<Content> {
    recent(history, HISTORY_WINDOW)
        .iter()
        .map(|msg| text_content(role_name(msg.role), &msg.content))
        .chain(std::iter::once(text_content("user", message)))
        .collect()
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn text_content(role: &str, text: &str) -> Content {
    Content {
        role: Some(role.to_string()),
        parts: vec![Part {
            text: Some(text.to_string()),
        }],
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, GeminiError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GeminiError::NoCandidates)?;

    candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .filter(|text| !text.is_empty())
        .map(|text| text.trim().to_string())
        .ok_or(GeminiError::EmptyResponse)
}
