use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alchemy_core::{ArtifactRef, Element, Identity};

use crate::cache::{CacheError, ElementCache};
use crate::config::ServerConfig;
use crate::provider::{
    GenerationProvider, ImageRequest, ProviderError, RANDOM_INSTRUCTION, RequestKind, TextRequest,
    combine_instruction, image_prompt,
};
use crate::rate_limit::{LimiterError, RateLimiter};

/// What the player asked for.
#[derive(Debug, Clone)]
pub enum ElementRequest {
    Random,
    Combine { prompt: String },
    Named { name: String },
}

impl ElementRequest {
    fn kind(&self) -> RequestKind {
        match self {
            Self::Random => RequestKind::Random,
            Self::Combine { .. } => RequestKind::Combine,
            Self::Named { .. } => RequestKind::Named,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error(transparent)]
    LimiterUnavailable(#[from] LimiterError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("invalid generation output: {0}")]
    Validation(String),
}

/// Tunables for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub scope: String,
    pub limiter_timeout: Duration,
    pub generation_timeout: Duration,
    pub cache_timeout: Duration,
    pub image_seed: u64,
}

impl OrchestratorSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            scope: config.rate_limit.scope.clone(),
            limiter_timeout: config.timeouts.limiter(),
            generation_timeout: config.timeouts.generation(),
            cache_timeout: config.timeouts.cache(),
            image_seed: config.provider.image_seed,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Produces elements, reusing cached artwork by identity.
///
/// Pipeline: rate limit, then name/description, then cache lookup by the
/// normalized name, and only on a miss an image render that is written back.
/// Artwork for one identity is rendered once and reused afterwards, give or
/// take concurrent misses racing on the same identity.
pub struct Orchestrator {
    limiter: Arc<dyn RateLimiter>,
    cache: Arc<dyn ElementCache>,
    provider: Arc<dyn GenerationProvider>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        cache: Arc<dyn ElementCache>,
        provider: Arc<dyn GenerationProvider>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            limiter,
            cache,
            provider,
            settings,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn generate(&self, request: ElementRequest) -> Result<Element, GenerationError> {
        self.admit().await?;

        let kind = request.kind();
        let (name, description) = match request {
            ElementRequest::Named { name } => (name.trim().to_string(), String::new()),
            ElementRequest::Random => self.describe(kind, RANDOM_INSTRUCTION.to_string()).await?,
            ElementRequest::Combine { prompt } => {
                self.describe(kind, combine_instruction(&prompt)).await?
            },
        };
        if name.is_empty() {
            return Err(GenerationError::Validation("empty element name".to_string()));
        }

        let element = Element::new(name, description);
        if let Some(image) = self.cached_artifact(&element.id).await {
            tracing::debug!(identity = %element.id, "cache hit");
            return Ok(element.with_image(image));
        }

        tracing::debug!(identity = %element.id, "cache miss, rendering");
        let image = self.render(kind, &element.name).await?;
        self.store_artifact(&element.id, &image).await;
        Ok(element.with_image(image))
    }

    async fn admit(&self) -> Result<(), GenerationError> {
        let decision = match tokio::time::timeout(
            self.settings.limiter_timeout,
            self.limiter.acquire(&self.settings.scope),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(scope = %self.settings.scope, "rate limiter timed out");
                return Err(LimiterError::Timeout(self.settings.limiter_timeout).into());
            },
        };
        if !decision.allowed {
            tracing::info!(scope = %self.settings.scope, "generation request rate limited");
            return Err(GenerationError::RateLimited {
                retry_after: decision.retry_after,
            });
        }
        Ok(())
    }

    async fn describe(
        &self,
        kind: RequestKind,
        instruction: String,
    ) -> Result<(String, String), GenerationError> {
        let seed = (kind == RequestKind::Random).then(|| rand::random_range(0..1_000_000));
        let request = TextRequest {
            kind,
            instruction,
            seed,
        };
        let draft = self
            .bounded(self.provider.generate_text(&request))
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "text generation failed"))?;

        let name = draft.name.map(|n| n.trim().to_string()).unwrap_or_default();
        let description = draft
            .description
            .map(|d| d.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() || description.is_empty() {
            return Err(GenerationError::Validation(
                "generated element is missing name or description".to_string(),
            ));
        }
        Ok((name, description))
    }

    async fn render(&self, kind: RequestKind, name: &str) -> Result<ArtifactRef, GenerationError> {
        let request = ImageRequest {
            kind,
            prompt: image_prompt(kind, name),
            seed: self.settings.image_seed,
        };
        self.bounded(self.provider.generate_image(&request))
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "image generation failed"))
            .map_err(Into::into)
    }

    /// Cache read. Failures count as a miss.
    async fn cached_artifact(&self, id: &Identity) -> Option<ArtifactRef> {
        let result = tokio::time::timeout(self.settings.cache_timeout, self.cache.get(id))
            .await
            .unwrap_or(Err(CacheError::Timeout));
        match result {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(identity = %id, error = %e, "cache read failed, treating as miss");
                None
            },
        }
    }

    /// Cache write. Failures are logged; the element is still returned.
    async fn store_artifact(&self, id: &Identity, image: &ArtifactRef) {
        let result = tokio::time::timeout(self.settings.cache_timeout, self.cache.set(id, image))
            .await
            .unwrap_or(Err(CacheError::Timeout));
        if let Err(e) = result {
            tracing::warn!(identity = %id, error = %e, "cache write failed");
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        tokio::time::timeout(self.settings.generation_timeout, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::rate_limit::TokenBucketLimiter;
    use crate::testing::{
        FailingCache, ScriptedProvider, StalledCache, StalledLimiter, StalledProvider,
    };

    fn orchestrator_with(
        provider: Arc<ScriptedProvider>,
        cache: Arc<dyn ElementCache>,
        capacity: u32,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(TokenBucketLimiter::new(capacity, 1, Duration::from_secs(300))),
            cache,
            provider,
            OrchestratorSettings::default(),
        )
    }

    #[tokio::test]
    async fn same_identity_renders_once() {
        let provider = Arc::new(ScriptedProvider::with_names(&["Shiny Fire", "shiny   fire"]));
        let orch = orchestrator_with(Arc::clone(&provider), Arc::new(MemoryCache::new()), 10);

        let first = orch.generate(ElementRequest::Random).await.unwrap();
        let second = orch
            .generate(ElementRequest::Combine {
                prompt: "fire + light".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(first.id.as_str(), "shiny-fire");
        assert_eq!(first.id, second.id);
        assert_eq!(first.image, second.image);
        assert!(first.image.is_some());
        assert_eq!(provider.image_calls(), 1);
        assert_eq!(provider.text_calls(), 2);
    }

    #[tokio::test]
    async fn miss_writes_artifact_to_cache() {
        let provider = Arc::new(ScriptedProvider::with_names(&["Steam"]));
        let cache = Arc::new(MemoryCache::new());
        let orch = orchestrator_with(provider, Arc::clone(&cache) as Arc<dyn ElementCache>, 10);

        let element = orch.generate(ElementRequest::Random).await.unwrap();
        let cached = cache.get(&element.id).await.unwrap();
        assert_eq!(cached, element.image);
    }

    #[tokio::test]
    async fn image_uses_fixed_seed_and_style() {
        let provider = Arc::new(ScriptedProvider::with_names(&["Cloud"]));
        let orch = orchestrator_with(Arc::clone(&provider), Arc::new(MemoryCache::new()), 10);
        orch.generate(ElementRequest::Random).await.unwrap();

        let request = provider.last_image_request().unwrap();
        assert_eq!(request.seed, 123);
        assert_eq!(request.prompt, image_prompt(RequestKind::Random, "Cloud"));
    }

    #[tokio::test]
    async fn named_request_skips_text_generation() {
        let provider = Arc::new(ScriptedProvider::with_names(&[]));
        let orch = orchestrator_with(Arc::clone(&provider), Arc::new(MemoryCache::new()), 10);

        let element = orch
            .generate(ElementRequest::Named {
                name: " Lava Lamp ".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(element.name, "Lava Lamp");
        assert_eq!(element.id.as_str(), "lava-lamp");
        assert!(element.description.is_empty());
        assert_eq!(provider.text_calls(), 0);
        assert_eq!(provider.image_calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_bucket_fails_fast_without_provider_calls() {
        let provider = Arc::new(ScriptedProvider::with_names(&["a", "b", "c"]));
        let orch = orchestrator_with(Arc::clone(&provider), Arc::new(MemoryCache::new()), 2);

        orch.generate(ElementRequest::Random).await.unwrap();
        orch.generate(ElementRequest::Random).await.unwrap();
        let err = orch.generate(ElementRequest::Random).await.unwrap_err();
        assert!(matches!(err, GenerationError::RateLimited { retry_after: Some(_) }));
        assert_eq!(provider.text_calls(), 2);
    }

    #[tokio::test]
    async fn stalled_limiter_fails_closed() {
        let provider = Arc::new(ScriptedProvider::with_names(&["a"]));
        let settings = OrchestratorSettings {
            limiter_timeout: Duration::from_millis(20),
            ..OrchestratorSettings::default()
        };
        let orch = Orchestrator::new(
            Arc::new(StalledLimiter),
            Arc::new(MemoryCache::new()),
            Arc::clone(&provider) as Arc<dyn GenerationProvider>,
            settings,
        );
        let err = orch.generate(ElementRequest::Random).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::LimiterUnavailable(LimiterError::Timeout(_))
        ));
        assert_eq!(provider.text_calls(), 0);
    }

    #[tokio::test]
    async fn stalled_provider_times_out() {
        let settings = OrchestratorSettings {
            generation_timeout: Duration::from_millis(30),
            ..OrchestratorSettings::default()
        };
        let orch = Orchestrator::new(
            Arc::new(TokenBucketLimiter::new(10, 1, Duration::from_secs(300))),
            Arc::new(MemoryCache::new()),
            Arc::new(StalledProvider),
            settings,
        );
        let err = orch.generate(ElementRequest::Random).await.unwrap_err();
        assert!(matches!(err, GenerationError::Provider(ProviderError::Timeout)));

        // A named request skips text and stalls on the render instead
        let err = orch
            .generate(ElementRequest::Named {
                name: "Mist".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Provider(ProviderError::Timeout)));
    }

    #[tokio::test]
    async fn stalled_cache_is_a_miss_and_write_is_skipped() {
        let provider = Arc::new(ScriptedProvider::with_names(&["Dew"]));
        let settings = OrchestratorSettings {
            cache_timeout: Duration::from_millis(30),
            ..OrchestratorSettings::default()
        };
        let orch = Orchestrator::new(
            Arc::new(TokenBucketLimiter::new(10, 1, Duration::from_secs(300))),
            Arc::new(StalledCache),
            Arc::clone(&provider) as Arc<dyn GenerationProvider>,
            settings,
        );
        let element = orch.generate(ElementRequest::Random).await.unwrap();
        assert_eq!(element.id.as_str(), "dew");
        assert!(element.has_image());
        assert_eq!(provider.image_calls(), 1);
    }

    #[tokio::test]
    async fn missing_description_is_validation_error() {
        let provider = Arc::new(ScriptedProvider::with_drafts(vec![Some((
            "fog".to_string(),
            String::new(),
        ))]));
        let orch = orchestrator_with(Arc::clone(&provider), Arc::new(MemoryCache::new()), 10);
        let err = orch.generate(ElementRequest::Random).await.unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
        assert_eq!(provider.image_calls(), 0);
    }

    #[tokio::test]
    async fn text_failure_is_provider_error() {
        let provider = Arc::new(ScriptedProvider::with_drafts(vec![None]));
        let orch = orchestrator_with(provider, Arc::new(MemoryCache::new()), 10);
        let err = orch.generate(ElementRequest::Random).await.unwrap_err();
        assert!(matches!(err, GenerationError::Provider(_)));
    }

    #[tokio::test]
    async fn image_failure_is_provider_error_and_not_cached() {
        let provider = Arc::new(ScriptedProvider::with_names(&["ash"]).failing_images());
        let cache = Arc::new(MemoryCache::new());
        let orch = orchestrator_with(provider, Arc::clone(&cache) as Arc<dyn ElementCache>, 10);
        let err = orch.generate(ElementRequest::Random).await.unwrap_err();
        assert!(matches!(err, GenerationError::Provider(_)));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn unavailable_cache_falls_through_to_generation() {
        let provider = Arc::new(ScriptedProvider::with_names(&["ember", "ember"]));
        let orch = orchestrator_with(Arc::clone(&provider), Arc::new(FailingCache), 10);

        let first = orch.generate(ElementRequest::Random).await.unwrap();
        let second = orch.generate(ElementRequest::Random).await.unwrap();
        assert!(first.image.is_some());
        assert_eq!(first.image, second.image);
        // Nothing could be cached, so both requests rendered
        assert_eq!(provider.image_calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_leave_one_stable_artifact() {
        let provider = Arc::new(ScriptedProvider::with_names(&["Rain"; 4]));
        let cache = Arc::new(MemoryCache::new());
        let orch = Arc::new(orchestrator_with(
            provider,
            Arc::clone(&cache) as Arc<dyn ElementCache>,
            10,
        ));

        let results = futures::future::join_all(
            (0..4).map(|_| {
                let orch = Arc::clone(&orch);
                async move { orch.generate(ElementRequest::Random).await.unwrap() }
            }),
        )
        .await;

        let id = Identity::from_name("rain");
        let cached = cache.get(&id).await.unwrap();
        assert!(cached.is_some());
        assert!(results.iter().all(|e| e.image == cached));
        assert_eq!(cache.len().await, 1);
    }
}
