use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use alchemy_core::ArtifactRef;
use alchemy_server::build_app_with;
use alchemy_server::cache::{ElementCache, MemoryCache};
use alchemy_server::config::ServerConfig;
use alchemy_server::provider::{
    ElementDraft, GenerationProvider, ImageRequest, ProviderError, TextRequest,
};
use alchemy_server::rate_limit::{RateLimiter, TokenBucketLimiter};
use alchemy_server::state::Backends;

/// Provider that names elements from a queue and renders `render:<prompt>`.
#[derive(Default)]
pub struct QueueProvider {
    names: Mutex<VecDeque<String>>,
    pub text_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

impl QueueProvider {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for QueueProvider {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn generate_text(&self, _request: &TextRequest) -> Result<ElementDraft, ProviderError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        let name = self.names.lock().unwrap().pop_front();
        match name {
            Some(name) => Ok(ElementDraft {
                description: Some(format!("A {name}.")),
                name: Some(name),
            }),
            None => Ok(ElementDraft::default()),
        }
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ArtifactRef, ProviderError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ArtifactRef::new(format!("render:{}", request.prompt)))
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub provider: Arc<QueueProvider>,
    pub cache: Arc<MemoryCache>,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with the default rate limit.
    pub async fn new(names: &[&str]) -> Self {
        Self::with_capacity(names, 15).await
    }

    /// Start a test server whose bucket holds `capacity` tokens and never refills.
    pub async fn with_capacity(names: &[&str], capacity: u32) -> Self {
        let limiter = TokenBucketLimiter::new(capacity, 0, Duration::from_secs(300));
        Self::with_limiter(names, Arc::new(limiter)).await
    }

    pub async fn with_limiter(names: &[&str], limiter: Arc<dyn RateLimiter>) -> Self {
        let provider = Arc::new(QueueProvider::new(names));
        let cache = Arc::new(MemoryCache::new());
        let backends = Backends {
            limiter,
            cache: Arc::clone(&cache) as Arc<dyn ElementCache>,
            provider: Arc::clone(&provider) as Arc<dyn GenerationProvider>,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (app, _state) = build_app_with(ServerConfig::default(), backends);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            provider,
            cache,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url())
    }
}
