use std::sync::Arc;

use crate::cache::{CacheError, ElementCache, MemoryCache};
use crate::config::ServerConfig;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::provider::{GenerationProvider, ProviderError};
use crate::rate_limit::{LimiterError, RateLimiter, TokenBucketLimiter};
use crate::together::TogetherProvider;
use crate::upstash::{UpstashCache, UpstashLimiter};

/// External capabilities the server is wired to.
pub struct Backends {
    pub limiter: Arc<dyn RateLimiter>,
    pub cache: Arc<dyn ElementCache>,
    pub provider: Arc<dyn GenerationProvider>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Limiter(#[from] LimiterError),
}

impl Backends {
    /// Build the production backends described by `config`. Configuring
    /// Upstash moves both the cache and the rate limiter into Redis.
    pub fn from_config(config: &ServerConfig) -> Result<Self, BackendError> {
        let provider = TogetherProvider::new(&config.provider, config.timeouts.generation())?;
        let rl = &config.rate_limit;
        let (cache, limiter): (Arc<dyn ElementCache>, Arc<dyn RateLimiter>) =
            match config.cache.upstash() {
                Some((url, token)) => (
                    Arc::new(UpstashCache::new(url, token, config.timeouts.cache())?),
                    Arc::new(UpstashLimiter::new(
                        url,
                        token,
                        config.timeouts.limiter(),
                        rl.capacity,
                        rl.refill_amount,
                        rl.refill_interval(),
                    )?),
                ),
                None => (
                    Arc::new(MemoryCache::new()),
                    Arc::new(TokenBucketLimiter::new(
                        rl.capacity,
                        rl.refill_amount,
                        rl.refill_interval(),
                    )),
                ),
            };
        Ok(Self {
            limiter,
            cache,
            provider: Arc::new(provider),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub cache: Arc<dyn ElementCache>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, backends: Backends) -> Self {
        let orchestrator = Orchestrator::new(
            backends.limiter,
            Arc::clone(&backends.cache),
            backends.provider,
            OrchestratorSettings::from_config(&config),
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            cache: backends.cache,
            config: Arc::new(config),
        }
    }
}
