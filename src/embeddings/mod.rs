// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Model host: the loaded query encoder and the options it runs with.

pub mod batcher;
pub mod device;
pub mod hashing;
pub mod model_host;
pub mod onnx_model;

pub use batcher::MicroBatcher;
pub use device::{Device, ThreadPolicy};
pub use hashing::HashingEncoder;
pub use model_host::{EncoderBackend, ModelConfig, ModelDescriptor, ModelHandle};
pub use onnx_model::OnnxEmbeddingModel;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Literal marker the encoder expects in front of every search query
pub const QUERY_PREFIX: &str = "search_query: ";

/// Per-call encoder options, fixed by the deployment mode at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Scale the output to unit Euclidean norm
    pub normalize: bool,
    /// Most queued queries run through one forward pass; 1 disables batching
    pub batch_size: usize,
}

impl EncodeOptions {
    pub fn new(normalize: bool, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(anyhow!("Batch size must be greater than 0"));
        }
        Ok(Self {
            normalize,
            batch_size,
        })
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            normalize: false,
            batch_size: 1,
        }
    }
}

/// Forward-only text encoder
///
/// Implementations hold no per-request state and expose no way to mutate
/// their weights, so one instance is shared by every request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryEncoder: Send + Sync {
    /// Encodes already-prefixed text into a vector of `dimension()` floats
    async fn encode(&self, text: &str, options: &EncodeOptions) -> Result<Vec<f32>>;

    /// Output dimensionality the encoder claims to produce
    fn dimension(&self) -> usize;

    /// Device the encoder is bound to
    fn device(&self) -> Device;
}

/// Raw forward pass over several already-prefixed texts, one vector per
/// text in input order. Blocking; callers run it off the async workers.
/// Never normalizes.
pub trait BatchForward: Send + Sync + 'static {
    fn forward_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Scales `vector` to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Euclidean norm of a vector
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}
