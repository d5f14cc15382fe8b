// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! `POST /` and `POST /embed-query` handler
//!
//! validate → adapter (in-process or proxy) → compose

use crate::api::embed::{EmbeddingRequest, EmbeddingResponse};
use crate::api::http_server::AppState;
use crate::api::GatewayError;
use axum::{extract::State, Json};
use bytes::Bytes;
use std::time::Instant;
use tracing::info;

/// Generates the embedding for one search query
///
/// # Request Body
/// ```json
/// {"text": "landlord heating repair obligations"}
/// ```
///
/// # Errors
/// - 400 when the body is malformed, `text` is missing, or `text` is blank
/// - 500 on model or dimension failures
/// - 503 / 504 when the sibling is unreachable or times out (proxy mode)
pub async fn embed_query_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EmbeddingResponse>, GatewayError> {
    let started = Instant::now();

    let request = EmbeddingRequest::from_payload(&body)?;
    let inference = state.adapter.infer(&request).await?;
    let response = EmbeddingResponse::compose(inference, started, &state.metadata)?;

    info!(
        "Embedded query ({} chars) in {}ms on {}",
        request.text.chars().count(),
        response.latency_ms,
        response.device
    );

    Ok(Json(response))
}
