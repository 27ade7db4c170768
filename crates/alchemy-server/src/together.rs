use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use alchemy_core::ArtifactRef;

use crate::config::ProviderConfig;
use crate::provider::{
    ElementDraft, GenerationProvider, ImageRequest, ProviderError, RequestKind, TextRequest,
    element_schema,
};

/// Together AI chat-completion and image endpoints.
pub struct TogetherProvider {
    client: reqwest::Client,
    /// Without a key every call fails with `NotConfigured`; the server still
    /// starts and serves cached artwork.
    api_key: Option<String>,
    config: ProviderConfig,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    steps: u32,
    response_format: &'static str,
    disable_safety_checker: bool,
    seed: u64,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

impl TogetherProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            config: config.clone(),
        })
    }

    fn text_model(&self, kind: RequestKind) -> &str {
        match kind {
            RequestKind::Random => &self.config.random_text_model,
            RequestKind::Combine | RequestKind::Named => &self.config.combine_text_model,
        }
    }

    fn image_steps(&self, kind: RequestKind) -> u32 {
        match kind {
            RequestKind::Random => self.config.random_image_steps,
            RequestKind::Combine => self.config.combine_image_steps,
            RequestKind::Named => self.config.named_image_steps,
        }
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("TOGETHER_AI_API_KEY"))?;
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }
        resp.json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Parse the JSON object the model returned as message content.
fn parse_draft(response: ChatResponse) -> Result<ElementDraft, ProviderError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::Malformed("no message content".to_string()))?;
    serde_json::from_str(&content).map_err(|e| ProviderError::Malformed(e.to_string()))
}

fn artifact_from(response: ImagesResponse) -> Result<ArtifactRef, ProviderError> {
    let first = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("no image data".to_string()))?;
    match (first.b64_json, first.url) {
        (Some(b64), _) => Ok(ArtifactRef::from_png_base64(&b64)),
        (None, Some(url)) => Ok(ArtifactRef::new(url)),
        (None, None) => Err(ProviderError::Malformed(
            "image entry has neither b64_json nor url".to_string(),
        )),
    }
}

#[async_trait]
impl GenerationProvider for TogetherProvider {
    fn name(&self) -> &'static str {
        "together"
    }

    async fn generate_text(&self, request: &TextRequest) -> Result<ElementDraft, ProviderError> {
        // Random requests push the model away from repeating common answers.
        let penalty = (request.kind == RequestKind::Random).then_some(1.0);
        let body = ChatRequest {
            model: self.text_model(request.kind),
            messages: vec![ChatMessage {
                role: "system",
                content: &request.instruction,
            }],
            response_format: ResponseFormat {
                kind: "json_object",
                schema: element_schema(request.kind),
            },
            temperature: self.config.temperature,
            seed: request.seed,
            frequency_penalty: penalty,
            presence_penalty: penalty,
        };
        let response: ChatResponse = self.post("/chat/completions", &body).await?;
        parse_draft(response)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ArtifactRef, ProviderError> {
        let body = ImagesRequest {
            model: &self.config.image_model,
            prompt: &request.prompt,
            steps: self.image_steps(request.kind),
            response_format: "base64",
            disable_safety_checker: true,
            seed: request.seed,
        };
        let response: ImagesResponse = self.post("/images/generations", &body).await?;
        artifact_from(response)
    }
}
