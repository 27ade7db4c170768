use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use alchemy_core::Identity;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cache: &'static str,
    pub provider: &'static str,
}

/// Health check endpoint. Reports version and configured backends.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        cache: state.cache.backend(),
        provider: state.orchestrator.provider_name(),
    })
}

/// Readiness check: the cache must answer a lookup within the cache timeout.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let sentinel = Identity::from_name("__readiness_check__");
    let lookup = tokio::time::timeout(state.config.timeouts.cache(), state.cache.get(&sentinel)).await;
    match lookup {
        Ok(Ok(_)) => (StatusCode::OK, "ready"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready: cache unavailable")
        },
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: cache timed out"),
    }
}
