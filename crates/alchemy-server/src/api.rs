use axum::extract::{Path, State};
use axum::response::Json;

use alchemy_core::Element;
use alchemy_core::Identity;
use alchemy_core::api::{CacheBatchRequest, CacheEntry, PromptRequest};

use crate::error::AppError;
use crate::orchestrator::ElementRequest;
use crate::state::AppState;

/// Trimmed prompt, rejected when empty or over the configured length.
fn validate_prompt(state: &AppState, prompt: &str) -> Result<String, AppError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("Missing prompt".to_string()));
    }
    let max = state.config.limits.max_prompt_len;
    if prompt.chars().count() > max {
        return Err(AppError::BadRequest(format!("prompt exceeds {max} chars")));
    }
    Ok(prompt.to_string())
}

fn validate_id(state: &AppState, raw: &str) -> Result<Identity, AppError> {
    if raw.is_empty() {
        return Err(AppError::BadRequest("Missing id".to_string()));
    }
    let max = state.config.limits.max_id_len;
    if raw.chars().count() > max {
        return Err(AppError::BadRequest(format!("id exceeds {max} chars")));
    }
    Ok(Identity::from_name(raw))
}

/// POST /api/elements/random: a fresh element with no player input.
pub async fn random_element(State(state): State<AppState>) -> Result<Json<Element>, AppError> {
    let element = state.orchestrator.generate(ElementRequest::Random).await?;
    Ok(Json(element))
}

/// POST /api/elements/combine: an element derived from a combination prompt.
pub async fn combine_elements(
    State(state): State<AppState>,
    Json(body): Json<PromptRequest>,
) -> Result<Json<Element>, AppError> {
    let prompt = validate_prompt(&state, &body.prompt)?;
    let element = state
        .orchestrator
        .generate(ElementRequest::Combine { prompt })
        .await?;
    Ok(Json(element))
}

/// POST /api/elements/generate: an element named by the prompt itself.
pub async fn generate_element(
    State(state): State<AppState>,
    Json(body): Json<PromptRequest>,
) -> Result<Json<Element>, AppError> {
    let name = validate_prompt(&state, &body.prompt)?;
    let element = state
        .orchestrator
        .generate(ElementRequest::Named { name })
        .await?;
    Ok(Json(element))
}

/// GET /api/cache/{id}: cached artwork for one identity.
pub async fn cached_artifact(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<CacheEntry>, AppError> {
    let id = validate_id(&state, &raw_id)?;
    let artifact = state.cache.get(&id).await.map_err(|e| {
        tracing::warn!(identity = %id, error = %e, "cache lookup failed");
        AppError::Internal("Cache unavailable".to_string())
    })?;
    Ok(Json(CacheEntry { id, artifact }))
}

/// POST /api/cache/batch: cached artwork for many identities, in request order.
pub async fn cached_artifacts(
    State(state): State<AppState>,
    Json(body): Json<CacheBatchRequest>,
) -> Result<Json<Vec<CacheEntry>>, AppError> {
    let limit = state.config.limits.max_batch_ids;
    if body.ids.len() > limit {
        return Err(AppError::BadRequest(format!(
            "Batch too large: {} (max {limit})",
            body.ids.len()
        )));
    }
    for id in &body.ids {
        validate_id(&state, id.as_str())?;
    }

    let artifacts = state.cache.multi_get(&body.ids).await.map_err(|e| {
        tracing::warn!(count = body.ids.len(), error = %e, "cache batch lookup failed");
        AppError::Internal("Cache unavailable".to_string())
    })?;
    let entries = body
        .ids
        .into_iter()
        .zip(artifacts)
        .map(|(id, artifact)| CacheEntry { id, artifact })
        .collect();
    Ok(Json(entries))
}
