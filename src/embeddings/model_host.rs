// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Model Host
//!
//! Owns the single encoder instance of the process. The handle is built
//! once at startup, wrapped in an `Arc`, and only ever read afterwards.

use super::onnx_model::OnnxLoadOptions;
use super::{
    BatchForward, Device, EncodeOptions, HashingEncoder, MicroBatcher, OnnxEmbeddingModel,
    QueryEncoder, ThreadPolicy,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Which encoder implementation backs the handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EncoderBackend {
    /// ONNX Runtime graph + HuggingFace tokenizer
    Onnx,
    /// Deterministic hash-seeded vectors, no weights needed
    Hashing,
}

/// Configuration for loading the query encoder
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model identifier reported to callers
    pub name: String,
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Path to tokenizer JSON file
    pub tokenizer_path: PathBuf,
    /// Expected embedding dimensions
    pub dimensions: usize,
    /// Tokenizer truncation limit
    pub max_tokens: usize,
    pub backend: EncoderBackend,
    /// Probe for an accelerator before falling back to CPU
    pub prefer_accelerator: bool,
    /// CPU thread budget (always-on deployments only)
    pub threads: Option<ThreadPolicy>,
    pub options: EncodeOptions,
}

/// Immutable facts about the loaded model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub dimensions: usize,
    pub max_tokens: usize,
    pub device: Device,
    pub threads: Option<ThreadPolicy>,
    /// Set when the handle was loaded from a `ModelConfig`
    pub backend: Option<EncoderBackend>,
}

/// Failure of a single encode call
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

/// Process-wide handle on the loaded encoder
#[derive(Clone)]
pub struct ModelHandle {
    encoder: Arc<dyn QueryEncoder>,
    descriptor: ModelDescriptor,
    options: EncodeOptions,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("descriptor", &self.descriptor)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    /// Loads the configured encoder. Blocks the caller until the model is
    /// fully usable; any error here must stop the process from serving.
    pub async fn load(config: &ModelConfig) -> Result<Self> {
        info!(
            "Loading embedding model {} ({:?} backend)",
            config.name, config.backend
        );

        let encoder: Arc<dyn QueryEncoder> = match config.backend {
            EncoderBackend::Onnx => {
                let name = config.name.clone();
                let model_path = config.model_path.clone();
                let tokenizer_path = config.tokenizer_path.clone();
                let load_options = OnnxLoadOptions {
                    dimension: config.dimensions,
                    max_length: config.max_tokens,
                    prefer_accelerator: config.prefer_accelerator,
                    threads: config.threads,
                };

                let model = tokio::task::spawn_blocking(move || {
                    OnnxEmbeddingModel::load(name, model_path, tokenizer_path, &load_options)
                })
                .await
                .context("Model loading task failed")?
                .map_err(|e| {
                    error!("✗ Failed to load model {}: {:#}", config.name, e);
                    e
                })?;

                with_batching(Arc::new(model), config.options.batch_size)
            }
            EncoderBackend::Hashing => {
                warn!(
                    "⚠️  Hashing backend selected: {} will serve hash-seeded vectors, not model output",
                    config.name
                );
                with_batching(
                    Arc::new(HashingEncoder::new(config.dimensions)?),
                    config.options.batch_size,
                )
            }
        };

        if encoder.dimension() != config.dimensions {
            anyhow::bail!(
                "Model {} dimension mismatch: expected {}, got {}",
                config.name,
                config.dimensions,
                encoder.dimension()
            );
        }

        let mut handle = Self::from_encoder(
            config.name.clone(),
            config.max_tokens,
            encoder,
            config.options,
        );
        handle.descriptor.threads = config.threads;
        handle.descriptor.backend = Some(config.backend);

        info!(
            "✓ Model {} ready on {} ({} dimensions)",
            handle.descriptor.name, handle.descriptor.device, handle.descriptor.dimensions
        );

        Ok(handle)
    }

    /// Wraps an already-constructed encoder
    pub fn from_encoder(
        name: impl Into<String>,
        max_tokens: usize,
        encoder: Arc<dyn QueryEncoder>,
        options: EncodeOptions,
    ) -> Self {
        let descriptor = ModelDescriptor {
            name: name.into(),
            dimensions: encoder.dimension(),
            max_tokens,
            device: encoder.device(),
            threads: None,
            backend: None,
        };
        Self {
            encoder,
            descriptor,
            options,
        }
    }

    /// Encodes prefixed query text and verifies the output length
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError> {
        let embedding = self.encoder.encode(text, &self.options).await?;

        if embedding.len() != self.descriptor.dimensions {
            return Err(EncodeError::DimensionMismatch {
                expected: self.descriptor.dimensions,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn options(&self) -> EncodeOptions {
        self.options
    }

    pub fn device(&self) -> Device {
        self.descriptor.device
    }
}

/// Puts a micro-batcher in front of `encoder` unless batching is off
fn with_batching<E>(encoder: Arc<E>, batch_size: usize) -> Arc<dyn QueryEncoder>
where
    E: BatchForward + QueryEncoder,
{
    if batch_size > 1 {
        Arc::new(MicroBatcher::spawn(encoder, batch_size))
    } else {
        encoder
    }
}
