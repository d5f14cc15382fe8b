// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::embed::embed_query_handler;
use super::health::{health_handler, info_handler};
use super::ServiceMetadata;
use crate::inference::InferenceAdapter;

/// Shared by every handler. Both fields are immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<dyn InferenceAdapter>,
    pub metadata: Arc<ServiceMetadata>,
}

impl AppState {
    pub fn new(adapter: Arc<dyn InferenceAdapter>, metadata: ServiceMetadata) -> Self {
        Self {
            adapter,
            metadata: Arc::new(metadata),
        }
    }
}

/// Builds the router. `max_concurrent_requests` caps admitted requests at
/// the HTTP boundary with one semaphore shared by every route; excess
/// requests wait for a slot.
pub fn create_app(state: AppState, max_concurrent_requests: Option<usize>) -> Router {
    let router = Router::new()
        .route("/", get(info_handler).post(embed_query_handler))
        .route("/embed-query", post(embed_query_handler))
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .with_state(state);

    let router = match max_concurrent_requests {
        Some(limit) => router.layer(GlobalConcurrencyLimitLayer::new(limit)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    max_concurrent_requests: Option<usize>,
) -> anyhow::Result<()> {
    let app = create_app(state, max_concurrent_requests);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
