use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use assistant_comfyui::generation::{PollConfig, DEFAULT_MAX_POLL_ATTEMPTS};
use assistant_core::template::default_template_path;
use assistant_gemini::{GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use axum::http::HeaderValue;

use crate::session::{SessionLimits, DEFAULT_IDLE_TTL, DEFAULT_MAX_SESSIONS};

/// Default ComfyUI instance used when a request does not name one.
pub const DEFAULT_COMFYUI_URL: &str = "http://127.0.0.1:8188";

/// Slack added on top of the worst-case image turn when sizing the HTTP
/// request timeout.
pub const REQUEST_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Shortest HTTP request timeout that still lets an image turn under `poll`
/// finish and report its outcome.
pub fn min_request_timeout_secs(poll: &PollConfig) -> u64 {
    let worst = poll.worst_case_turn().as_millis().div_ceil(1000);
    u64::try_from(worst)
        .unwrap_or(u64::MAX)
        .saturating_add(REQUEST_TIMEOUT_MARGIN_SECS)
}

/// A setting that could not be parsed or is out of range.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{var} must be at least {min}, got {value}")]
    TooSmall {
        var: &'static str,
        min: u64,
        value: u64,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds. Never shorter than
    /// [`min_request_timeout_secs`] for the configured polling schedule.
    pub request_timeout_secs: u64,
    /// `None` when no key is configured; the Gemini provider then answers
    /// with a setup hint instead of calling out.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    /// ComfyUI base URL used when a chat request does not override it.
    pub comfyui_url: String,
    /// Location of the workflow template.
    pub workflow_path: PathBuf,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    /// Sessions untouched for this long are dropped.
    pub session_idle_ttl_secs: u64,
    /// Upper bound on live sessions; the least recently used one is
    /// dropped to make room.
    pub max_sessions: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                                            |
    /// |-----------------------------|----------------------------------------------------|
    /// | `HOST`                      | `0.0.0.0`                                          |
    /// | `PORT`                      | `3000`                                             |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`                            |
    /// | `REQUEST_TIMEOUT_SECS`      | worst-case image turn plus 10s (699 by default)    |
    /// | `GEMINI_API_KEY`            | unset                                              |
    /// | `GEMINI_MODEL`              | `gemini-1.5-flash`                                 |
    /// | `GEMINI_BASE_URL`           | `https://generativelanguage.googleapis.com/v1beta` |
    /// | `COMFYUI_URL`               | `http://127.0.0.1:8188`                            |
    /// | `WORKFLOW_PATH`             | `comfy_workflow.json` next to the executable       |
    /// | `COMFYUI_POLL_INTERVAL_MS`  | `1000`                                             |
    /// | `COMFYUI_MAX_POLL_ATTEMPTS` | `60`                                               |
    /// | `SESSION_IDLE_TTL_SECS`     | `3600`                                             |
    /// | `MAX_SESSIONS`              | `1000`                                             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        if let Some(bad) = cors_origins.iter().find(|o| o.parse::<HeaderValue>().is_err()) {
            return Err(ConfigError::Invalid {
                var: "CORS_ORIGINS",
                expected: "origin list",
                value: bad.clone(),
            });
        }

        let poll_interval_ms = parse_var(&lookup, "COMFYUI_POLL_INTERVAL_MS", 1000, "u64")?;
        let max_poll_attempts = parse_var(
            &lookup,
            "COMFYUI_MAX_POLL_ATTEMPTS",
            DEFAULT_MAX_POLL_ATTEMPTS,
            "u32",
        )?;
        at_least("COMFYUI_MAX_POLL_ATTEMPTS", 1, u64::from(max_poll_attempts))?;

        let min_timeout = min_request_timeout_secs(&PollConfig {
            interval: Duration::from_millis(poll_interval_ms),
            max_attempts: max_poll_attempts,
        });
        let request_timeout_secs =
            parse_var(&lookup, "REQUEST_TIMEOUT_SECS", min_timeout, "u64")?;
        at_least("REQUEST_TIMEOUT_SECS", min_timeout, request_timeout_secs)?;

        let session_idle_ttl_secs = parse_var(
            &lookup,
            "SESSION_IDLE_TTL_SECS",
            DEFAULT_IDLE_TTL.as_secs(),
            "u64",
        )?;
        at_least("SESSION_IDLE_TTL_SECS", 1, session_idle_ttl_secs)?;
        let max_sessions = parse_var(&lookup, "MAX_SESSIONS", DEFAULT_MAX_SESSIONS, "usize")?;
        at_least("MAX_SESSIONS", 1, max_sessions as u64)?;

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_var(&lookup, "PORT", 3000, "u16")?,
            cors_origins,
            request_timeout_secs,
            gemini_api_key: var("GEMINI_API_KEY").map(|k| k.trim().to_string()),
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            gemini_base_url: var("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            comfyui_url: var("COMFYUI_URL").unwrap_or_else(|| DEFAULT_COMFYUI_URL.into()),
            workflow_path: var("WORKFLOW_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_template_path),
            poll_interval_ms,
            max_poll_attempts,
            session_idle_ttl_secs,
            max_sessions,
        })
    }

    /// Polling schedule for image generation.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }

    /// Timeout applied to every HTTP request.
    ///
    /// Configurations built by hand skip [`ServerConfig::from_lookup`], so
    /// the floor is applied here too.
    pub fn request_timeout(&self) -> Duration {
        let floor = min_request_timeout_secs(&self.poll_config());
        Duration::from_secs(self.request_timeout_secs.max(floor))
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            idle_ttl: Duration::from_secs(self.session_idle_ttl_secs),
            max_sessions: self.max_sessions,
        }
    }

    /// Gemini client settings, when an API key is configured.
    pub fn gemini_config(&self) -> Option<GeminiConfig> {
        self.gemini_api_key.as_ref().map(|key| GeminiConfig {
            model: self.gemini_model.clone(),
            base_url: self.gemini_base_url.clone(),
            ..GeminiConfig::new(key.clone())
        })
    }
}

fn at_least(var: &'static str, min: u64, value: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::TooSmall { var, min, value });
    }
    Ok(())
}

fn parse_var<F, T>(
    lookup: &F,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        }),
    }
}
