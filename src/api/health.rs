// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! `GET /health` and `GET /info`
//!
//! Both are read-only snapshots of process metadata. Health additionally
//! probes the sibling in proxy mode; a failed probe is reported in the body,
//! never raised.

use crate::api::http_server::AppState;
use crate::config::DeploymentMode;
use crate::embeddings::EncoderBackend;
use crate::inference::Readiness;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamHealth {
    pub url: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub model: String,
    pub device: String,
    pub deployment: String,
    pub gpu_available: bool,
    pub always_on: bool,
    pub cold_start: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Optimizations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intra_op_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inter_op_threads: Option<usize>,
    pub parallel_execution: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder_backend: Option<EncoderBackend>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfoResponse {
    pub model: String,
    pub dimensions: usize,
    pub max_tokens: usize,
    pub provider: String,
    pub device: String,
    pub hardware: String,
    pub deployment: String,
    pub deployment_description: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_url: Option<String>,
    pub optimizations: Optimizations,
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let metadata = &state.metadata;
    let readiness = state.adapter.probe().await;
    let healthy = readiness.is_ready();

    let upstream = metadata.upstream_url.as_ref().map(|url| UpstreamHealth {
        url: url.clone(),
        reachable: healthy,
        detail: match &readiness {
            Readiness::Ready => None,
            Readiness::Unavailable { detail } => Some(detail.clone()),
        },
    });

    if let Readiness::Unavailable { detail } = &readiness {
        warn!("Health check failed: {}", detail);
    }

    // Load balancers in front of a proxy should drain it while the sibling is down
    let status_code = if !healthy && metadata.mode == DeploymentMode::Proxy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        model: metadata.model.clone(),
        device: metadata.device.clone(),
        deployment: metadata.mode.to_string(),
        gpu_available: metadata.device == "cuda",
        always_on: metadata.mode.always_on(),
        cold_start: metadata.mode.cold_start(),
        upstream,
    };

    (status_code, Json(body))
}

pub async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    let metadata = &state.metadata;

    Json(InfoResponse {
        model: metadata.model.clone(),
        dimensions: metadata.dimensions,
        max_tokens: metadata.max_tokens,
        provider: metadata.provider.clone(),
        device: metadata.device.clone(),
        hardware: metadata.hardware.clone(),
        deployment: metadata.mode.to_string(),
        deployment_description: metadata.mode.description().to_string(),
        version: metadata.version.to_string(),
        upstream_url: metadata.upstream_url.clone(),
        optimizations: Optimizations {
            intra_op_threads: metadata.threads.map(|t| t.intra_op),
            inter_op_threads: metadata.threads.map(|t| t.inter_op),
            parallel_execution: metadata
                .threads
                .map(|t| t.parallel_execution())
                .unwrap_or(false),
            normalize: metadata.normalize,
            batch_size: metadata.batch_size,
            encoder_backend: metadata.backend,
        },
    })
}
