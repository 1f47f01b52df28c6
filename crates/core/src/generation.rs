//! Image generation parameters, defaults, and range validation.
//!
//! Callers supply an [`ImageSettings`] with every field optional; it is
//! resolved exactly once per generation request into a fully-populated
//! [`GenerationParameters`]. Seed randomization happens during that
//! resolution, never while polling.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Smallest accepted latent width/height in pixels.
pub const MIN_DIMENSION: u32 = 256;
/// Largest accepted latent width/height in pixels.
pub const MAX_DIMENSION: u32 = 2048;

/// Minimum images per batch.
pub const MIN_BATCH_SIZE: u32 = 1;
/// Maximum images per batch.
pub const MAX_BATCH_SIZE: u32 = 8;

/// Minimum sampler steps.
pub const MIN_STEPS: u32 = 1;
/// Maximum sampler steps.
pub const MAX_STEPS: u32 = 50;

/// Minimum classifier-free guidance scale.
pub const MIN_CFG_SCALE: f64 = 1.0;
/// Maximum classifier-free guidance scale.
pub const MAX_CFG_SCALE: f64 = 20.0;

/// Upper bound (inclusive) for randomly drawn seeds: `2^63 - 1`.
pub const MAX_RANDOM_SEED: u64 = i64::MAX as u64;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 512;
pub const DEFAULT_BATCH_SIZE: u32 = 1;
pub const DEFAULT_STEPS: u32 = 20;
pub const DEFAULT_CFG_SCALE: f64 = 7.0;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Fully-resolved runtime parameters injected into a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub width: u32,
    pub height: u32,
    pub batch_size: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub seed: u64,
    pub prompt_text: String,
}

/// Optional, caller-facing overrides for a single image request.
///
/// Any field left as `None` falls back to the crate default. A missing
/// `seed` means "randomize".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub cfg_scale: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ImageSettings {
    /// Resolve these settings into validated parameters for `prompt_text`.
    ///
    /// The seed is drawn here, once, when none was supplied.
    pub fn resolve(&self, prompt_text: &str) -> Result<GenerationParameters, CoreError> {
        let seed = self.seed.unwrap_or_else(random_seed);
        let params = GenerationParameters {
            width: self.width.unwrap_or(DEFAULT_WIDTH),
            height: self.height.unwrap_or(DEFAULT_HEIGHT),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            steps: self.steps.unwrap_or(DEFAULT_STEPS),
            cfg_scale: self.cfg_scale.unwrap_or(DEFAULT_CFG_SCALE),
            seed,
            prompt_text: prompt_text.trim().to_string(),
        };
        params.validate()?;
        Ok(params)
    }
}

impl GenerationParameters {
    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_range("width", self.width, MIN_DIMENSION, MAX_DIMENSION)?;
        validate_range("height", self.height, MIN_DIMENSION, MAX_DIMENSION)?;
        validate_range("batch_size", self.batch_size, MIN_BATCH_SIZE, MAX_BATCH_SIZE)?;
        validate_range("steps", self.steps, MIN_STEPS, MAX_STEPS)?;
        validate_cfg_scale(self.cfg_scale)?;
        validate_prompt_text(&self.prompt_text)
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), CoreError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{field} must be between {min} and {max}, got {value}"
        )))
    }
}

/// Validate the guidance scale. NaN is rejected along with out-of-range values.
pub fn validate_cfg_scale(value: f64) -> Result<(), CoreError> {
    if (MIN_CFG_SCALE..=MAX_CFG_SCALE).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "cfg_scale must be between {MIN_CFG_SCALE:.1} and {MAX_CFG_SCALE:.1}, got {value}"
        )))
    }
}

/// Validate that the prompt text is not blank.
pub fn validate_prompt_text(text: &str) -> Result<(), CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::Validation(
            "prompt_text must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Draw a seed uniformly from `[0, 2^63 - 1]`.
pub fn random_seed() -> u64 {
    rand::rng().random_range(0..=MAX_RANDOM_SEED)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
