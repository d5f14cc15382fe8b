// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Proxy strategy against real loopback siblings
//!
//! Each test binds a sibling on an ephemeral port: either a full gateway
//! hosting the hashing encoder, or a stub that misbehaves on purpose.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use inception_gateway::{
    api::{
        create_app, AppState, EmbeddingRequest, ErrorResponse, GatewayError, HealthResponse,
        InfoResponse, ServiceMetadata,
    },
    config::DeploymentMode,
    embeddings::{EncodeOptions, HashingEncoder, ModelHandle},
    inference::{
        InProcessAdapter, InferenceAdapter, ProxyAdapter, ProxyConfig, ReadinessPolicy,
        UPSTREAM_DEVICE,
    },
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::util::ServiceExt;
use url::Url;

const DIMENSIONS: usize = 768;

/// Helper: sibling gateway hosting the hashing encoder in-process
fn sibling_gateway() -> Router {
    let handle = ModelHandle::from_encoder(
        "modernbert-embed-base_finetune_512",
        8192,
        Arc::new(HashingEncoder::new(DIMENSIONS).unwrap()),
        EncodeOptions::default(),
    );
    let metadata = ServiceMetadata::for_model(&handle, DeploymentMode::Accelerated, "FreeLawProject");
    let state = AppState::new(Arc::new(InProcessAdapter::new(Arc::new(handle))), metadata);
    create_app(state, None)
}

async fn spawn_sibling(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Address nothing listens on
async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn proxy_config(addr: SocketAddr, request_timeout: Duration) -> ProxyConfig {
    ProxyConfig {
        upstream_url: Url::parse(&format!("http://{}", addr)).unwrap(),
        embed_path: "/".to_string(),
        health_path: "/health".to_string(),
        request_timeout,
        probe_timeout: Duration::from_millis(500),
        dimensions: DIMENSIONS,
    }
}

/// Helper: proxy-mode gateway in front of `addr`
fn proxy_app(addr: SocketAddr, request_timeout: Duration) -> Router {
    let config = proxy_config(addr, request_timeout);
    let metadata = ServiceMetadata {
        model: "modernbert-embed-base_finetune_512".to_string(),
        dimensions: DIMENSIONS,
        max_tokens: 8192,
        provider: "FreeLawProject".to_string(),
        device: UPSTREAM_DEVICE.to_string(),
        hardware: "Sibling process".to_string(),
        mode: DeploymentMode::Proxy,
        normalize: None,
        batch_size: None,
        threads: None,
        backend: None,
        upstream_url: Some(config.upstream_url.to_string()),
        version: inception_gateway::version::VERSION_NUMBER,
    };
    let adapter = ProxyAdapter::new(config).unwrap();
    create_app(AppState::new(Arc::new(adapter), metadata), None)
}

fn post_text(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_proxy_relays_sibling_embedding() {
    let addr = spawn_sibling(sibling_gateway()).await;
    let adapter = ProxyAdapter::new(proxy_config(addr, Duration::from_secs(5))).unwrap();

    let request = EmbeddingRequest::new("landlord heating repair obligations").unwrap();
    let inference = adapter.infer(&request).await.unwrap();

    assert_eq!(inference.embedding.len(), DIMENSIONS);
    assert_eq!(inference.device, UPSTREAM_DEVICE);
}

#[tokio::test]
async fn test_proxy_matches_in_process_result() {
    let text = r#"{"text": "wrongful termination retaliation"}"#;
    let addr = spawn_sibling(sibling_gateway()).await;

    let direct = sibling_gateway().oneshot(post_text(text)).await.unwrap();
    let direct: serde_json::Value = read_json(direct).await;

    let proxied = proxy_app(addr, Duration::from_secs(5))
        .oneshot(post_text(text))
        .await
        .unwrap();
    assert_eq!(proxied.status(), StatusCode::OK);
    let proxied: serde_json::Value = read_json(proxied).await;

    // Prefix is applied once, by the sibling
    assert_eq!(proxied["embedding"], direct["embedding"]);
    assert_eq!(proxied["dimensions"], 768);
    assert_eq!(proxied["deployment"], "proxy");
    assert_eq!(proxied["device"], UPSTREAM_DEVICE);
}

#[tokio::test]
async fn test_proxy_reports_one_device_everywhere() {
    let addr = spawn_sibling(sibling_gateway()).await;
    let app = proxy_app(addr, Duration::from_secs(5));

    let embedded = app
        .clone()
        .oneshot(post_text(r#"{"text": "adverse possession"}"#))
        .await
        .unwrap();
    assert_eq!(embedded.status(), StatusCode::OK);
    let embedded: serde_json::Value = read_json(embedded).await;

    let health: HealthResponse = read_json(
        app.clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;
    let info: InfoResponse = read_json(
        app.oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;

    // The sibling runs on "cpu"; the proxy never repeats that
    assert_eq!(embedded["device"], health.device.as_str());
    assert_eq!(health.device, info.device);
    assert_eq!(info.device, UPSTREAM_DEVICE);
}

#[tokio::test]
async fn test_proxy_validates_before_forwarding() {
    // Nothing listens here; a forwarded request would fail with 503
    let addr = closed_port().await;

    let response = proxy_app(addr, Duration::from_secs(5))
        .oneshot(post_text(r#"{"text": "   "}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.error_type, "empty_text");
}

#[tokio::test]
async fn test_proxy_timeout_maps_to_gateway_timeout() {
    let slow = Router::new().route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"embedding": []}))
        }),
    );
    let addr = spawn_sibling(slow).await;

    let adapter = ProxyAdapter::new(proxy_config(addr, Duration::from_millis(200))).unwrap();
    let err = adapter
        .infer(&EmbeddingRequest::new("slow query").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::UpstreamTimeout { timeout_ms: 200 });

    let response = proxy_app(addr, Duration::from_millis(200))
        .oneshot(post_text(r#"{"text": "slow query"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.error_type, "upstream_timeout");
}

#[tokio::test]
async fn test_proxy_unreachable_sibling() {
    let addr = closed_port().await;

    let adapter = ProxyAdapter::new(proxy_config(addr, Duration::from_secs(2))).unwrap();
    let err = adapter
        .infer(&EmbeddingRequest::new("anything").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));

    let response = proxy_app(addr, Duration::from_secs(2))
        .oneshot(post_text(r#"{"text": "anything"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_proxy_sibling_client_error_is_internal() {
    let rejecting = Router::new().route(
        "/",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": "text too long"})),
            )
        }),
    );
    let addr = spawn_sibling(rejecting).await;

    let response = proxy_app(addr, Duration::from_secs(5))
        .oneshot(post_text(r#"{"text": "some query"}"#))
        .await
        .unwrap();

    // The gateway validated the query, so a sibling rejection is not the caller's fault
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.error_type, "upstream_error");
    assert_eq!(error.upstream_status, Some(422));
    assert_eq!(error.detail.as_deref(), Some("text too long"));
}

#[tokio::test]
async fn test_proxy_sibling_server_error_is_internal() {
    let failing = Router::new().route(
        "/",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
    );
    let addr = spawn_sibling(failing).await;

    let response = proxy_app(addr, Duration::from_secs(5))
        .oneshot(post_text(r#"{"text": "some query"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.upstream_status, Some(502));
    assert_eq!(error.detail.as_deref(), Some("upstream exploded"));
}

#[tokio::test]
async fn test_proxy_rejects_wrong_dimensions() {
    let short = Router::new().route(
        "/",
        post(|| async { Json(json!({"embedding": vec![0.5f32; 384], "device": "cuda"})) }),
    );
    let addr = spawn_sibling(short).await;

    let adapter = ProxyAdapter::new(proxy_config(addr, Duration::from_secs(5))).unwrap();
    let err = adapter
        .infer(&EmbeddingRequest::new("query").unwrap())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GatewayError::DimensionMismatch {
            expected: 768,
            actual: 384
        }
    );
}

#[tokio::test]
async fn test_proxy_health_healthy_sibling() {
    let addr = spawn_sibling(sibling_gateway()).await;

    let response = proxy_app(addr, Duration::from_secs(5))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponse = read_json(response).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.deployment, "proxy");
    let upstream = health.upstream.unwrap();
    assert!(upstream.reachable);
    assert!(upstream.detail.is_none());
}

#[tokio::test]
async fn test_proxy_health_unreachable_sibling() {
    let addr = closed_port().await;

    let response = proxy_app(addr, Duration::from_secs(5))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health: HealthResponse = read_json(response).await;
    assert_eq!(health.status, "unhealthy");
    let upstream = health.upstream.unwrap();
    assert!(!upstream.reachable);
    assert!(upstream.detail.is_some());
}

#[tokio::test]
async fn test_proxy_health_sibling_error_status() {
    let sick = Router::new().route(
        "/health",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let addr = spawn_sibling(sick).await;

    let response = proxy_app(addr, Duration::from_secs(5))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_wait_until_ready_succeeds() {
    let addr = spawn_sibling(sibling_gateway()).await;
    let adapter = ProxyAdapter::new(proxy_config(addr, Duration::from_secs(5))).unwrap();

    let policy = ReadinessPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    };

    assert!(adapter.wait_until_ready(&policy).await);
}

#[tokio::test]
async fn test_wait_until_ready_gives_up() {
    let addr = closed_port().await;
    let adapter = ProxyAdapter::new(proxy_config(addr, Duration::from_secs(5))).unwrap();

    let policy = ReadinessPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    };

    let started = std::time::Instant::now();
    assert!(!adapter.wait_until_ready(&policy).await);
    // Two sleeps: 10ms + 20ms
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_wait_until_ready_sibling_comes_up_late() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let adapter = ProxyAdapter::new(proxy_config(addr, Duration::from_secs(5))).unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, sibling_gateway()).await.unwrap();
    });

    let policy = ReadinessPolicy {
        max_attempts: 8,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
    };

    assert!(adapter.wait_until_ready(&policy).await);
}
