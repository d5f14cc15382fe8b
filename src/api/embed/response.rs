// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! EmbeddingResponse type and the response composer

use crate::api::{GatewayError, ServiceMetadata};
use crate::inference::{ensure_dimensions, Inference};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Response body for `POST /`
///
/// # Example
/// ```json
/// {
///   "embedding": [0.123, -0.456, 0.789],
///   "dimensions": 768,
///   "model": "modernbert-embed-base_finetune_512",
///   "latency_ms": 1500,
///   "device": "cpu",
///   "deployment": "always-on"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,

    /// Always equal to `embedding.len()`
    pub dimensions: usize,

    pub model: String,

    /// Wall-clock time from request arrival to composition
    pub latency_ms: u64,

    pub device: String,

    pub deployment: String,
}

impl EmbeddingResponse {
    /// Assembles the payload, re-checking the vector length so malformed
    /// output never leaves the process.
    pub fn compose(
        inference: Inference,
        started: Instant,
        metadata: &ServiceMetadata,
    ) -> Result<Self, GatewayError> {
        ensure_dimensions(&inference.embedding, metadata.dimensions)?;

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(Self {
            dimensions: inference.embedding.len(),
            embedding: inference.embedding,
            model: metadata.model.clone(),
            latency_ms,
            device: inference.device,
            deployment: metadata.mode.to_string(),
        })
    }
}
