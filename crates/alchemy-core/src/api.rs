use serde::{Deserialize, Serialize};

use crate::element::ArtifactRef;
use crate::identity::Identity;

/// Route prefix shared by the server router and the HTTP client.
pub const API_PREFIX: &str = "/api";

pub const RANDOM_ELEMENT_PATH: &str = "/elements/random";
pub const COMBINE_ELEMENTS_PATH: &str = "/elements/combine";
pub const GENERATE_ELEMENT_PATH: &str = "/elements/generate";
pub const CACHE_BATCH_PATH: &str = "/cache/batch";

/// Path of the single-artifact cache lookup for `id`.
pub fn cache_lookup_path(id: &Identity) -> String {
    format!("/cache/{id}")
}

/// Body for `/elements/combine` and `/elements/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

/// Body for `/cache/batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheBatchRequest {
    pub ids: Vec<Identity>,
}

/// One cache lookup result. Batch responses keep request order and length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: Identity,
    pub artifact: Option<ArtifactRef>,
}

/// JSON error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_lookup_path_uses_identity() {
        assert_eq!(
            cache_lookup_path(&Identity::from_name("Hot Lava")),
            "/cache/hot-lava"
        );
    }

    #[test]
    fn error_body_is_camel_case() {
        let body = ErrorBody {
            status_code: 429,
            message: "Too many requests".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["statusCode"], 429);
        assert_eq!(json["message"], "Too many requests");
    }

    #[test]
    fn cache_entry_absent_artifact_is_null() {
        let entry = CacheEntry {
            id: Identity::from_name("fire"),
            artifact: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json["artifact"].is_null());
    }
}
