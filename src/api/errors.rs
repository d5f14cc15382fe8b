// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Gateway error taxonomy and its HTTP mapping.
//!
//! Validators and adapters return these as plain values; only the
//! `IntoResponse` impl at the edge turns them into status codes.

use crate::embeddings::model_host::EncodeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// JSON body of every failed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    pub request_id: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// Body is not a JSON object, or a field has the wrong type
    #[error("Invalid request body: {0}")]
    InvalidPayload(String),

    #[error("Missing '{field}' field")]
    MissingField { field: String },

    #[error("Text cannot be empty")]
    EmptyText,

    #[error("Invalid dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    /// Sibling answered with a non-success status
    #[error("Upstream returned {status}: {detail}")]
    Upstream { status: u16, detail: String },

    #[error("Upstream did not respond within {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl GatewayError {
    pub fn missing_field(field: &str) -> Self {
        GatewayError::MissingField {
            field: field.to_string(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::InvalidPayload(_) => "invalid_payload",
            GatewayError::MissingField { .. } => "missing_field",
            GatewayError::EmptyText => "empty_text",
            GatewayError::DimensionMismatch { .. } => "dimension_mismatch",
            GatewayError::ModelInvocation(_) => "model_invocation_error",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidPayload(_)
            | GatewayError::MissingField { .. }
            | GatewayError::EmptyText => StatusCode::BAD_REQUEST,
            // Requests are validated before forwarding, so any sibling
            // rejection is a gateway/sibling mismatch
            GatewayError::DimensionMismatch { .. }
            | GatewayError::ModelInvocation(_)
            | GatewayError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Builds the response body. Server-side failures get a generic message
    /// with the specifics moved into `detail`.
    pub fn to_response(&self, request_id: String) -> ErrorResponse {
        let (message, detail) = match self {
            GatewayError::InvalidPayload(_)
            | GatewayError::MissingField { .. }
            | GatewayError::EmptyText => (self.to_string(), None),
            GatewayError::DimensionMismatch { .. } | GatewayError::ModelInvocation(_) => (
                "Embedding generation failed".to_string(),
                Some(self.to_string()),
            ),
            GatewayError::Upstream { detail, .. } => (
                "Upstream embedding service returned an error".to_string(),
                Some(detail.clone()),
            ),
            GatewayError::UpstreamTimeout { .. } => (
                "Upstream embedding service timed out".to_string(),
                Some(self.to_string()),
            ),
            GatewayError::UpstreamUnavailable(reason) => (
                "Upstream embedding service unavailable".to_string(),
                Some(reason.clone()),
            ),
        };

        let upstream_status = match self {
            GatewayError::Upstream { status, .. } => Some(*status),
            _ => None,
        };

        ErrorResponse {
            error_type: self.error_type().to_string(),
            message,
            detail,
            upstream_status,
            request_id,
        }
    }
}

impl From<EncodeError> for GatewayError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::DimensionMismatch { expected, actual } => {
                GatewayError::DimensionMismatch { expected, actual }
            }
            EncodeError::Model(e) => GatewayError::ModelInvocation(format!("{:#}", e)),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        let status = self.status_code();

        if status.is_server_error() {
            error!(request_id = %request_id, "Request failed: {}", self);
        } else {
            warn!(request_id = %request_id, "Request rejected: {}", self);
        }

        (status, axum::Json(self.to_response(request_id))).into_response()
    }
}
