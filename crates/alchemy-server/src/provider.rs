use async_trait::async_trait;
use serde::Deserialize;

use alchemy_core::ArtifactRef;

/// What kind of element is being generated. Selects the model, the
/// instruction, and the image style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// An arbitrary new element, no player input.
    Random,
    /// A new element derived from a combination prompt.
    Combine,
    /// An element whose name is given verbatim.
    Named,
}

/// Text generation call producing a name and a description.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub kind: RequestKind,
    pub instruction: String,
    pub seed: Option<u64>,
}

/// Text output before validation. Either field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementDraft {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Image generation call.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub kind: RequestKind,
    pub prompt: String,
    pub seed: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(&'static str),
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed provider payload: {0}")]
    Malformed(String),
    #[error("provider timed out")]
    Timeout,
}

/// Text and image generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate_text(&self, request: &TextRequest) -> Result<ElementDraft, ProviderError>;

    async fn generate_image(&self, request: &ImageRequest) -> Result<ArtifactRef, ProviderError>;
}

/// System instruction for random elements.
pub const RANDOM_INSTRUCTION: &str = "Generate a random common noun (Refer to general categories \
    of people, places, or things) or a random abstract noun (Refer to ideas, concepts, or \
    qualities that cannot be touched or seen (e.g., love, freedom, happiness)) and description \
    and return it in JSON format. The name should be a singular common noun in lowercase \
    without punctuation.";

/// System instruction for a combination prompt.
pub fn combine_instruction(prompt: &str) -> String {
    format!("Generate a common or abstract noun and description based on the prompt: {prompt}")
}

/// Image prompt for an element name. Only the name is embedded, so one
/// identity always renders from one prompt.
pub fn image_prompt(kind: RequestKind, name: &str) -> String {
    match kind {
        RequestKind::Random => format!(
            "Claymorphic soft 3D illustration of {name}, minimalistic design, smooth surfaces, \
             pastel colors, centered, white background, no shadows, high contrast, logo style, \
             flat lighting, high resolution"
        ),
        RequestKind::Combine | RequestKind::Named => format!(
            "shiny 3D illustration of {name}, minimalistic design, smooth surfaces, bright \
             colors, centered, white background, no shadows, high contrast, logo style, flat \
             lighting, high resolution"
        ),
    }
}

/// JSON schema handed to the text model.
pub fn element_schema(kind: RequestKind) -> serde_json::Value {
    let name_hint = match kind {
        RequestKind::Random => "A random common or abstract noun up to 3 words",
        RequestKind::Combine | RequestKind::Named => "A random common or abstract noun",
    };
    serde_json::json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": name_hint },
            "description": {
                "type": "string",
                "description": "A short one sentence description of the name."
            }
        },
        "required": ["name", "description"]
    })
}
