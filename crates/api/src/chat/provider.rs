use serde::{Deserialize, Serialize};

/// The assistant that answers a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Repeats the user's input back.
    Echo,
    /// Hosted language model.
    Gemini,
    /// ComfyUI image generation.
    Image,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Echo,
        ProviderKind::Gemini,
        ProviderKind::Image,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Echo => "Echo Bot",
            ProviderKind::Gemini => "Gemini Bot",
            ProviderKind::Image => "Image Bot",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ProviderKind::Echo => "I'll echo back whatever you say!",
            ProviderKind::Gemini => "Ask me anything - I'm powered by Google's Gemini AI",
            ProviderKind::Image => "Describe an image and I'll generate it for you!",
        }
    }
}

/// Provider listing entry with its current readiness.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub kind: ProviderKind,
    pub name: &'static str,
    pub description: &'static str,
    /// Whether the provider can answer right now.
    pub ready: bool,
    /// Setup hint shown when the provider is not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Default ComfyUI instance (image provider only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comfyui_url: Option<String>,
}

impl ProviderInfo {
    pub fn new(kind: ProviderKind, ready: bool) -> Self {
        Self {
            kind,
            name: kind.display_name(),
            description: kind.description(),
            ready,
            hint: None,
            comfyui_url: None,
        }
    }
}
