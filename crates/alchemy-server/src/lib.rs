pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod provider;
pub mod rate_limit;
pub mod state;
pub mod together;
pub mod upstash;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use alchemy_core::api::{
    API_PREFIX, CACHE_BATCH_PATH, COMBINE_ELEMENTS_PATH, GENERATE_ELEMENT_PATH,
    RANDOM_ELEMENT_PATH,
};

use config::ServerConfig;
use state::{AppState, BackendError, Backends};

/// Build the Axum router and application state from a config, wiring the
/// production backends it describes.
pub fn build_app(config: ServerConfig) -> Result<(Router<()>, AppState), BackendError> {
    let backends = Backends::from_config(&config)?;
    Ok(build_app_with(config, backends))
}

/// Build the Axum router around explicitly supplied backends.
pub fn build_app_with(config: ServerConfig, backends: Backends) -> (Router<()>, AppState) {
    let web_root = config.web_root.clone();
    let state = AppState::new(config, backends);

    let api_routes = Router::new()
        .route(RANDOM_ELEMENT_PATH, post(api::random_element))
        .route(COMBINE_ELEMENTS_PATH, post(api::combine_elements))
        .route(GENERATE_ELEMENT_PATH, post(api::generate_element))
        .route(CACHE_BATCH_PATH, post(api::cached_artifacts))
        .route("/cache/{id}", get(api::cached_artifact));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest(API_PREFIX, api_routes)
        .fallback_service(ServeDir::new(&web_root))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}
