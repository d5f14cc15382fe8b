// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Inference adapters
//!
//! A validated request reaches the encoder through one of two
//! interchangeable strategies: the model loaded in this process, or a
//! sibling process reached over loopback HTTP. Either way the vector is
//! checked against the deployed dimensionality before it is returned.

pub mod in_process;
pub mod proxy;

pub use in_process::InProcessAdapter;
pub use proxy::{ProxyAdapter, ProxyConfig, ReadinessPolicy, UPSTREAM_DEVICE};

use crate::api::embed::EmbeddingRequest;
use crate::api::GatewayError;
use async_trait::async_trait;

/// Output of one successful inference
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub embedding: Vec<f32>,
    /// Device that produced the vector
    pub device: String,
}

/// Whether the model behind an adapter can currently serve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Unavailable { detail: String },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    /// Produces the embedding for a validated request
    async fn infer(&self, request: &EmbeddingRequest) -> Result<Inference, GatewayError>;

    /// Checks the model is reachable. Never fails; problems are reported
    /// as `Readiness::Unavailable`.
    async fn probe(&self) -> Readiness;
}

/// Output-shape postcondition shared by every strategy
pub fn ensure_dimensions(embedding: &[f32], expected: usize) -> Result<(), GatewayError> {
    if embedding.len() != expected {
        return Err(GatewayError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}
