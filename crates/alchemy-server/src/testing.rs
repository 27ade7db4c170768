//! In-process fakes for the generation pipeline's external capabilities.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use alchemy_core::{ArtifactRef, Identity};

use crate::cache::{CacheError, ElementCache};
use crate::provider::{
    ElementDraft, GenerationProvider, ImageRequest, ProviderError, TextRequest,
};
use crate::rate_limit::{LimiterError, RateDecision, RateLimiter};

/// Provider that replays queued text outputs and renders deterministic
/// artwork from the image prompt and seed.
pub struct ScriptedProvider {
    drafts: Mutex<VecDeque<Option<(String, String)>>>,
    fail_images: bool,
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
    last_image: Mutex<Option<ImageRequest>>,
}

impl ScriptedProvider {
    /// Each entry is one text response; `None` is a transport failure.
    pub fn with_drafts(drafts: Vec<Option<(String, String)>>) -> Self {
        Self {
            drafts: Mutex::new(drafts.into()),
            fail_images: false,
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            last_image: Mutex::new(None),
        }
    }

    /// One successful text response per name.
    pub fn with_names(names: &[&str]) -> Self {
        Self::with_drafts(
            names
                .iter()
                .map(|n| Some((n.to_string(), format!("A {n}."))))
                .collect(),
        )
    }

    pub fn failing_images(mut self) -> Self {
        self.fail_images = true;
        self
    }

    pub fn push_name(&self, name: &str) {
        if let Ok(mut drafts) = self.drafts.lock() {
            drafts.push_back(Some((name.to_string(), format!("A {name}."))));
        }
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn last_image_request(&self) -> Option<ImageRequest> {
        self.last_image.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate_text(&self, _request: &TextRequest) -> Result<ElementDraft, ProviderError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .drafts
            .lock()
            .map_err(|_| ProviderError::Transport("poisoned".to_string()))?
            .pop_front();
        match next {
            Some(Some((name, description))) => Ok(ElementDraft {
                name: Some(name),
                description: Some(description),
            }),
            Some(None) => Err(ProviderError::Transport("connection reset".to_string())),
            None => Err(ProviderError::Malformed("script exhausted".to_string())),
        }
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ArtifactRef, ProviderError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_image.lock() {
            *last = Some(request.clone());
        }
        if self.fail_images {
            return Err(ProviderError::Status {
                status: 503,
                body: "overloaded".to_string(),
            });
        }
        Ok(ArtifactRef::new(format!(
            "render:{}:{}",
            request.seed, request.prompt
        )))
    }
}

/// Cache whose every call fails.
pub struct FailingCache;

#[async_trait]
impl ElementCache for FailingCache {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _id: &Identity) -> Result<Option<ArtifactRef>, CacheError> {
        Err(CacheError::Transport("connection refused".to_string()))
    }

    async fn set(&self, _id: &Identity, _artifact: &ArtifactRef) -> Result<(), CacheError> {
        Err(CacheError::Transport("connection refused".to_string()))
    }

    async fn multi_get(&self, _ids: &[Identity]) -> Result<Vec<Option<ArtifactRef>>, CacheError> {
        Err(CacheError::Transport("connection refused".to_string()))
    }
}

/// Limiter that never answers.
pub struct StalledLimiter;

#[async_trait]
impl RateLimiter for StalledLimiter {
    async fn acquire(&self, _scope: &str) -> Result<RateDecision, LimiterError> {
        std::future::pending().await
    }
}

/// Provider whose calls never complete.
pub struct StalledProvider;

#[async_trait]
impl GenerationProvider for StalledProvider {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn generate_text(&self, _request: &TextRequest) -> Result<ElementDraft, ProviderError> {
        std::future::pending().await
    }

    async fn generate_image(&self, _request: &ImageRequest) -> Result<ArtifactRef, ProviderError> {
        std::future::pending().await
    }
}

/// Cache whose calls never complete.
pub struct StalledCache;

#[async_trait]
impl ElementCache for StalledCache {
    fn backend(&self) -> &'static str {
        "stalled"
    }

    async fn get(&self, _id: &Identity) -> Result<Option<ArtifactRef>, CacheError> {
        std::future::pending().await
    }

    async fn set(&self, _id: &Identity, _artifact: &ArtifactRef) -> Result<(), CacheError> {
        std::future::pending().await
    }

    async fn multi_get(&self, _ids: &[Identity]) -> Result<Vec<Option<ArtifactRef>>, CacheError> {
        std::future::pending().await
    }
}
