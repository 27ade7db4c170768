use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;

use alchemy_core::api::{
    API_PREFIX, CACHE_BATCH_PATH, COMBINE_ELEMENTS_PATH, CacheBatchRequest, CacheEntry, ErrorBody,
    PromptRequest, RANDOM_ELEMENT_PATH, cache_lookup_path,
};
use alchemy_core::{Element, Identity};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("too many requests, try again later")]
    RateLimited,
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Element generation and artwork lookup, as seen by the client.
#[allow(async_fn_in_trait)]
pub trait ElementService {
    async fn random_element(&self) -> Result<Element, ServiceError>;

    async fn combine_elements(&self, prompt: &str) -> Result<Element, ServiceError>;

    /// Cached artwork for each identity, in request order.
    async fn fetch_artifacts(&self, ids: &[Identity]) -> Result<Vec<CacheEntry>, ServiceError>;
}

/// `ElementService` over the server's JSON API.
pub struct HttpElementService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpElementService {
    /// `base_url` is the server origin, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::send(request).await
    }

    async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, ServiceError> {
        let resp = request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ServiceError::RateLimited);
        }
        if !status.is_success() {
            let message = match resp.json::<ErrorBody>().await {
                Ok(body) => body.message,
                Err(_) => status.to_string(),
            };
            return Err(ServiceError::Server {
                status: status.as_u16(),
                message,
            });
        }
        resp.json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    /// Cached artwork for one identity.
    pub async fn fetch_artifact(&self, id: &Identity) -> Result<CacheEntry, ServiceError> {
        Self::send(self.client.get(self.url(&cache_lookup_path(id)))).await
    }
}

impl ElementService for HttpElementService {
    async fn random_element(&self) -> Result<Element, ServiceError> {
        self.post::<(), _>(RANDOM_ELEMENT_PATH, None).await
    }

    async fn combine_elements(&self, prompt: &str) -> Result<Element, ServiceError> {
        let body = PromptRequest {
            prompt: prompt.to_string(),
        };
        self.post(COMBINE_ELEMENTS_PATH, Some(&body)).await
    }

    async fn fetch_artifacts(&self, ids: &[Identity]) -> Result<Vec<CacheEntry>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = CacheBatchRequest { ids: ids.to_vec() };
        let entries: Vec<CacheEntry> = self.post(CACHE_BATCH_PATH, Some(&body)).await?;
        if entries.len() != ids.len() {
            return Err(ServiceError::Decode(format!(
                "expected {} cache entries, got {}",
                ids.len(),
                entries.len()
            )));
        }
        Ok(entries)
    }
}

/// Cached artwork for `ids`. No request is made when `ids` is empty.
pub async fn fetch_missing_artifacts<S: ElementService>(
    service: &S,
    ids: &[Identity],
) -> Result<Vec<CacheEntry>, ServiceError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    service.fetch_artifacts(ids).await
}

/// Request `count` random elements concurrently. One failure does not cancel
/// the others; results come back in request order.
pub async fn seed_elements<S: ElementService>(
    service: &S,
    count: usize,
) -> Vec<Result<Element, ServiceError>> {
    join_all((0..count).map(|_| service.random_element())).await
}
