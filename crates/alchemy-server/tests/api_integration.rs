#[allow(dead_code)]
mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use alchemy_core::{Element, Identity};
use alchemy_server::cache::ElementCache;
use alchemy_server::upstash::UpstashLimiter;
use common::TestServer;

#[tokio::test]
async fn health_endpoint_reports_backends() {
    let server = TestServer::new(&[]).await;
    let resp = reqwest::get(format!("{}/health", server.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache"], "memory");
    assert_eq!(body["provider"], "queue");
}

#[tokio::test]
async fn ready_endpoint_ok_with_memory_cache() {
    let server = TestServer::new(&[]).await;
    let resp = reqwest::get(format!("{}/ready", server.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ready");
}

#[tokio::test]
async fn random_element_is_generated_and_cached() {
    let server = TestServer::new(&["Lightning Bolt"]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.api_url("/elements/random"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let element: Element = resp.json().await.unwrap();
    assert_eq!(element.id.as_str(), "lightning-bolt");
    assert_eq!(element.description, "A Lightning Bolt.");

    let cached = server.cache.get(&element.id).await.unwrap();
    assert_eq!(cached, element.image);
}

#[tokio::test]
async fn combine_reuses_artwork_for_known_identity() {
    let server = TestServer::new(&["Shiny Fire", "shiny   FIRE"]).await;
    let client = reqwest::Client::new();

    let first: Element = client
        .post(server.api_url("/elements/random"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: Element = client
        .post(server.api_url("/elements/combine"))
        .json(&serde_json::json!({ "prompt": "fire + shine" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.image, second.image);
    assert_eq!(server.provider.image_calls(), 1);
}

#[tokio::test]
async fn generate_names_element_from_prompt() {
    let server = TestServer::new(&[]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.api_url("/elements/generate"))
        .json(&serde_json::json!({ "prompt": "Crystal Ball" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let element: Element = resp.json().await.unwrap();
    assert_eq!(element.id.as_str(), "crystal-ball");
    assert_eq!(element.description, "");
}

#[tokio::test]
async fn blank_prompt_is_bad_request() {
    let server = TestServer::new(&[]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.api_url("/elements/combine"))
        .json(&serde_json::json!({ "prompt": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["statusCode"], 400);
}

#[tokio::test]
async fn exhausted_bucket_returns_429() {
    let server = TestServer::with_capacity(&["a", "b", "c"], 2).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .post(server.api_url("/elements/random"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    let resp = client
        .post(server.api_url("/elements/random"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Too many requests");
}

#[tokio::test]
async fn incomplete_generation_returns_500() {
    // Empty name queue makes the provider return a draft with no fields
    let server = TestServer::new(&[]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.api_url("/elements/random"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Failed to generate element");
    assert_eq!(server.provider.image_calls(), 0);
}

#[tokio::test]
async fn unreachable_limiter_backend_returns_500() {
    let limiter = UpstashLimiter::new(
        "http://127.0.0.1:9",
        "tok",
        Duration::from_secs(2),
        15,
        5,
        Duration::from_secs(300),
    )
    .unwrap();
    let server = TestServer::with_limiter(&["fire"], Arc::new(limiter)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.api_url("/elements/random"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Failed to generate element");
    assert_eq!(server.provider.text_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_endpoints_read_through() {
    let server = TestServer::new(&["Ocean Wave"]).await;
    let client = reqwest::Client::new();

    let element: Element = client
        .post(server.api_url("/elements/random"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let single: serde_json::Value = client
        .get(server.api_url("/cache/ocean-wave"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(single["id"], "ocean-wave");
    assert_eq!(
        single["artifact"].as_str(),
        element.image.as_ref().map(|a| a.as_str())
    );

    let batch: serde_json::Value = client
        .post(server.api_url("/cache/batch"))
        .json(&serde_json::json!({ "ids": ["unknown", "ocean-wave"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = batch.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "unknown");
    assert!(entries[0]["artifact"].is_null());
    assert_eq!(entries[1]["id"], "ocean-wave");
    assert!(entries[1]["artifact"].is_string());
}

#[tokio::test]
async fn batch_ids_are_normalized() {
    let server = TestServer::new(&[]).await;
    server
        .cache
        .set(
            &Identity::from_name("hot lava"),
            &alchemy_core::test_helpers::fake_artifact("hot lava"),
        )
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let batch: serde_json::Value = client
        .post(server.api_url("/cache/batch"))
        .json(&serde_json::json!({ "ids": ["Hot  Lava"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(batch[0]["id"], "hot-lava");
    assert!(batch[0]["artifact"].is_string());
}
