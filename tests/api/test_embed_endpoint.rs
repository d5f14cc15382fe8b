// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end tests for `POST /` and `POST /embed-query`
//!
//! Requests go through the full router (validation, in-process adapter,
//! response assembly, error mapping) with the hashing encoder standing in
//! for the ONNX model.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use inception_gateway::{
    api::{create_app, AppState, EmbeddingResponse, ErrorResponse, ServiceMetadata},
    config::{DeploymentMode, DEFAULT_DIMENSIONS, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_NAME},
    embeddings::{
        l2_norm, Device, EncodeOptions, HashingEncoder, ModelHandle, QueryEncoder, QUERY_PREFIX,
    },
    inference::InProcessAdapter,
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`

/// Helper: router backed by the hashing encoder at the deployed dimensionality
fn setup_app(normalize: bool) -> Router {
    let handle = ModelHandle::from_encoder(
        DEFAULT_MODEL_NAME,
        DEFAULT_MAX_TOKENS,
        Arc::new(HashingEncoder::new(DEFAULT_DIMENSIONS).unwrap()),
        EncodeOptions::new(normalize, 1).unwrap(),
    );
    let metadata = ServiceMetadata::for_model(&handle, DeploymentMode::AlwaysOn, "FreeLawProject");
    let state = AppState::new(Arc::new(InProcessAdapter::new(Arc::new(handle))), metadata);
    create_app(state, None)
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn embed_ok(app: Router, uri: &str, body: &str) -> EmbeddingResponse {
    let response = app.oneshot(post(uri, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&read_body(response).await).unwrap()
}

async fn embed_err(app: Router, body: &str) -> (StatusCode, ErrorResponse) {
    let response = app.oneshot(post("/", body)).await.unwrap();
    let status = response.status();
    let error: ErrorResponse = serde_json::from_slice(&read_body(response).await).unwrap();
    (status, error)
}

#[tokio::test]
async fn test_embed_returns_full_vector() {
    let app = setup_app(false);

    let response = embed_ok(app, "/", r#"{"text": "landlord heating repair obligations"}"#).await;

    assert_eq!(response.embedding.len(), 768);
    assert_eq!(response.dimensions, 768);
    assert_eq!(response.model, "modernbert-embed-base_finetune_512");
    assert_eq!(response.device, "cpu");
    assert_eq!(response.deployment, "always-on");
    assert!(response.embedding.iter().all(|v| v.is_finite()));
}

#[tokio::test]
async fn test_embed_applies_query_prefix() {
    let app = setup_app(false);
    let text = "statute of limitations for breach of contract";

    let response = embed_ok(app, "/", &format!(r#"{{"text": "{}"}}"#, text)).await;

    let encoder = HashingEncoder::new(768).unwrap();
    let options = EncodeOptions::default();
    let prefixed = encoder
        .encode(&format!("{}{}", QUERY_PREFIX, text), &options)
        .await
        .unwrap();
    let bare = encoder.encode(text, &options).await.unwrap();

    assert_eq!(response.embedding, prefixed);
    assert_ne!(response.embedding, bare);
}

#[tokio::test]
async fn test_embed_is_deterministic() {
    let body = r#"{"text": "qualified immunity excessive force"}"#;

    let first = embed_ok(setup_app(false), "/", body).await;
    let second = embed_ok(setup_app(false), "/", body).await;

    assert_eq!(first.embedding, second.embedding);
}

#[tokio::test]
async fn test_embed_query_alias_route() {
    let body = r#"{"text": "adverse possession elements"}"#;

    let root = embed_ok(setup_app(false), "/", body).await;
    let alias = embed_ok(setup_app(false), "/embed-query", body).await;

    assert_eq!(root.embedding, alias.embedding);
}

#[tokio::test]
async fn test_embed_normalized_vectors_have_unit_norm() {
    let response = embed_ok(
        setup_app(true),
        "/",
        r#"{"text": "fourth amendment warrantless search"}"#,
    )
    .await;

    assert!((l2_norm(&response.embedding) - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_embed_ignores_extra_fields() {
    let response = embed_ok(
        setup_app(false),
        "/",
        r#"{"text": "habeas corpus", "model": "ignored", "extra": 1}"#,
    )
    .await;

    assert_eq!(response.dimensions, 768);
}

#[tokio::test]
async fn test_missing_text_field() {
    let (status, error) = embed_err(setup_app(false), r#"{"query": "no text key"}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error_type, "missing_field");
    assert_eq!(error.message, "Missing 'text' field");
    assert!(!error.request_id.is_empty());
}

#[tokio::test]
async fn test_empty_object_is_missing_text() {
    let (status, error) = embed_err(setup_app(false), "{}").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error_type, "missing_field");
}

#[tokio::test]
async fn test_blank_text_rejected() {
    for body in [r#"{"text": ""}"#, r#"{"text": "   "}"#, r#"{"text": "\n\t"}"#, r#"{"text": null}"#] {
        let (status, error) = embed_err(setup_app(false), body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(error.error_type, "empty_text", "body: {}", body);
        assert_eq!(error.message, "Text cannot be empty");
    }
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    for body in ["{not json", "[\"text\"]", r#"{"text": 42}"#] {
        let (status, error) = embed_err(setup_app(false), body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(error.error_type, "invalid_payload", "body: {}", body);
    }
}

#[tokio::test]
async fn test_concurrent_requests_all_succeed() {
    let app = setup_app(false);
    let mut handles = Vec::new();

    for i in 0..16 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            embed_ok(app, "/", &format!(r#"{{"text": "query number {}"}}"#, i)).await
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.embedding.len(), 768);
    }
}

/// Holds every encode for a while and records how many overlap
struct SlowEncoder {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl QueryEncoder for SlowEncoder {
    async fn encode(&self, _text: &str, _options: &EncodeOptions) -> anyhow::Result<Vec<f32>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![0.5; DEFAULT_DIMENSIONS])
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSIONS
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_spans_both_routes() {
    let encoder = Arc::new(SlowEncoder {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let handle = ModelHandle::from_encoder(
        DEFAULT_MODEL_NAME,
        DEFAULT_MAX_TOKENS,
        Arc::clone(&encoder) as Arc<dyn QueryEncoder>,
        EncodeOptions::default(),
    );
    let metadata = ServiceMetadata::for_model(&handle, DeploymentMode::AlwaysOn, "FreeLawProject");
    let state = AppState::new(Arc::new(InProcessAdapter::new(Arc::new(handle))), metadata);
    let app = create_app(state, Some(2));

    let mut handles = Vec::new();
    for i in 0..6 {
        let app = app.clone();
        let uri = if i % 2 == 0 { "/" } else { "/embed-query" };
        handles.push(tokio::spawn(async move {
            app.oneshot(post(uri, r#"{"text": "res judicata"}"#))
                .await
                .unwrap()
                .status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    // One limit shared by `/` and `/embed-query`, not one per route
    assert_eq!(encoder.peak.load(Ordering::SeqCst), 2);
}
