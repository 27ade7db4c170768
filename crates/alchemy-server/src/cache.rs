use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use alchemy_core::{ArtifactRef, Identity};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache request failed: {0}")]
    Transport(String),
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("unexpected cache response: {0}")]
    Decode(String),
    #[error("cache timed out")]
    Timeout,
}

/// Artifact store keyed by identity.
///
/// `set` overwrites. There is no compare-and-set: two concurrent misses for
/// one identity may both generate and both write.
#[async_trait]
pub trait ElementCache: Send + Sync {
    /// Short backend name for health output.
    fn backend(&self) -> &'static str;

    async fn get(&self, id: &Identity) -> Result<Option<ArtifactRef>, CacheError>;

    async fn set(&self, id: &Identity, artifact: &ArtifactRef) -> Result<(), CacheError>;

    /// Results are in input order, one per id.
    async fn multi_get(&self, ids: &[Identity]) -> Result<Vec<Option<ArtifactRef>>, CacheError>;
}

/// In-process cache used when no remote backend is configured.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Identity, ArtifactRef>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ElementCache for MemoryCache {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &Identity) -> Result<Option<ArtifactRef>, CacheError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn set(&self, id: &Identity, artifact: &ArtifactRef) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(id.clone(), artifact.clone());
        Ok(())
    }

    async fn multi_get(&self, ids: &[Identity]) -> Result<Vec<Option<ArtifactRef>>, CacheError> {
        let entries = self.entries.read().await;
        Ok(ids.iter().map(|id| entries.get(id).cloned()).collect())
    }
}
