// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX Embedding Model Wrapper
//!
//! Runs a sentence-transformer export (ModernBERT by default) through
//! ONNX Runtime.
//!
//! Features:
//! - ONNX model loading from disk, validated with a probe inference
//! - CUDA execution provider when requested and available, CPU otherwise
//! - Intra/inter-op thread budget for CPU deployments
//! - Tokenizer truncation to the model's token limit
//! - Attention-masked mean pooling for token-level outputs
//! - Runtime dimension check on every call

use super::{l2_normalize, BatchForward, Device, EncodeOptions, QueryEncoder, ThreadPolicy};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ndarray::{Array2, ArrayViewD, Axis};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

/// Text used for the load-time probe inference
const PROBE_TEXT: &str = "search_query: validation probe";

/// How the session should be built
#[derive(Debug, Clone)]
pub struct OnnxLoadOptions {
    /// Expected output dimension
    pub dimension: usize,
    /// Tokenizer truncation limit
    pub max_length: usize,
    /// Try the CUDA provider before falling back to CPU
    pub prefer_accelerator: bool,
    /// CPU thread budget; `None` leaves ONNX Runtime defaults
    pub threads: Option<ThreadPolicy>,
}

/// ONNX-based query encoder
///
/// The session sits behind a mutex because ort's `Session::run` needs
/// exclusive access; weights are never modified after load.
#[derive(Clone)]
pub struct OnnxEmbeddingModel {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    dimension: usize,
    max_length: usize,
    device: Device,
    /// BERT-style graphs take token_type_ids, ModernBERT does not
    feeds_token_type_ids: bool,
}

impl std::fmt::Debug for OnnxEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingModel")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("max_length", &self.max_length)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingModel {
    /// Loads the model and tokenizer from disk. Blocks until the probe
    /// inference has confirmed the output dimension.
    ///
    /// # Errors
    /// Returns error if:
    /// - Model or tokenizer file not found or invalid
    /// - ONNX Runtime initialization fails on every provider tried
    /// - The probe inference does not produce `options.dimension` values
    pub fn load<P: AsRef<Path>>(
        model_name: impl Into<String>,
        model_path: P,
        tokenizer_path: P,
        options: &OnnxLoadOptions,
    ) -> Result<Self> {
        let model_name = model_name.into();
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("ONNX model file not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            anyhow::bail!("Tokenizer file not found: {}", tokenizer_path.display());
        }

        let (session, device) = if options.prefer_accelerator {
            info!("🚀 Attempting CUDA execution provider...");
            let cuda = CUDAExecutionProvider::default().build().error_on_failure();
            match build_session(model_path, cuda, options.threads) {
                Ok(session) => {
                    info!("✅ CUDA execution provider initialized");
                    (session, Device::Cuda)
                }
                Err(e) => {
                    warn!("⚠️  CUDA execution provider failed: {:#}", e);
                    warn!("   Falling back to CPU execution provider");
                    let cpu = CPUExecutionProvider::default().build();
                    (build_session(model_path, cpu, options.threads)?, Device::Cpu)
                }
            }
        } else {
            let cpu = CPUExecutionProvider::default().build();
            (build_session(model_path, cpu, options.threads)?, Device::Cpu)
        };

        let feeds_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: options.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;

        let model = Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_name,
            dimension: options.dimension,
            max_length: options.max_length,
            device,
            feeds_token_type_ids,
        };

        // Probe inference catches a swapped model artifact before serving
        model
            .forward(&[PROBE_TEXT.to_string()])
            .context("Model validation inference failed")?;

        info!(
            "✅ ONNX embedding model {} loaded on {} ({} dimensions, {} max tokens)",
            model.model_name, model.device, model.dimension, model.max_length
        );

        Ok(model)
    }

    /// One forward pass over `texts`: tokenize, right-pad to the longest
    /// sequence, run the graph, pool each row, check each dimension.
    /// Padded positions carry a zero attention mask.
    fn forward(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(text.as_str(), true)
                    .map_err(|e| anyhow!("Tokenization failed: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let batch = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|encoding| encoding.get_ids().len())
            .max()
            .unwrap_or(0);
        debug!("Tokenized {} queries, longest {} tokens", batch, seq_len);

        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        for (row, encoding) in encodings.iter().enumerate() {
            let tokens = encoding.get_ids().iter().zip(encoding.get_attention_mask());
            for (col, (&id, &mask)) in tokens.enumerate() {
                input_ids[[row, col]] = id as i64;
                attention_mask[[row, col]] = mask as i64;
            }
        }
        let masks = attention_mask.clone();

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ONNX session lock poisoned"))?;

        let outputs = if self.feeds_token_type_ids {
            let token_type_ids = Array2::<i64>::zeros((batch, seq_len));
            session.run(ort::inputs![
                "input_ids" => Value::from_array(input_ids)?,
                "attention_mask" => Value::from_array(attention_mask)?,
                "token_type_ids" => Value::from_array(token_type_ids)?
            ])?
        } else {
            session.run(ort::inputs![
                "input_ids" => Value::from_array(input_ids)?,
                "attention_mask" => Value::from_array(attention_mask)?
            ])?
        };

        // Index [0] rather than a name: exports disagree on output names
        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        let mut embeddings = Vec::with_capacity(batch);
        for row in 0..batch {
            let mask = masks.row(row).to_vec();
            let embedding = pool(output.view(), row, &mask)?;

            if embedding.len() != self.dimension {
                anyhow::bail!(
                    "Unexpected embedding dimension: {} (expected {})",
                    embedding.len(),
                    self.dimension
                );
            }
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }
}

impl BatchForward for OnnxEmbeddingModel {
    fn forward_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.forward(texts)
    }
}

#[async_trait]
impl QueryEncoder for OnnxEmbeddingModel {
    async fn encode(&self, text: &str, options: &EncodeOptions) -> Result<Vec<f32>> {
        let model = self.clone();
        let texts = vec![text.to_owned()];

        let mut embedding = tokio::task::spawn_blocking(move || model.forward(&texts))
            .await
            .context("Inference task failed")??
            .pop()
            .ok_or_else(|| anyhow!("Forward pass returned no vector"))?;

        if options.normalize {
            l2_normalize(&mut embedding);
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn device(&self) -> Device {
        self.device
    }
}

fn build_session(
    model_path: &Path,
    provider: ExecutionProviderDispatch,
    threads: Option<ThreadPolicy>,
) -> Result<Session> {
    let mut builder = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([provider])
        .context("Failed to set execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?;

    if let Some(policy) = threads {
        info!(
            "   CPU thread budget: {} intra-op, {} inter-op",
            policy.intra_op, policy.inter_op
        );
        builder = builder
            .with_intra_threads(policy.intra_op)
            .context("Failed to set intra threads")?
            .with_inter_threads(policy.inter_op)
            .context("Failed to set inter threads")?
            .with_parallel_execution(policy.parallel_execution())
            .context("Failed to set execution mode")?;
    }

    builder
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))
}

/// Reduces batch item `row` of the graph output to one vector.
///
/// `[batch, hidden]` outputs are already pooled. `[batch, seq_len, hidden]`
/// outputs get a mean over the tokens whose attention mask is set.
fn pool(output: ArrayViewD<'_, f32>, row: usize, attention_mask: &[i64]) -> Result<Vec<f32>> {
    if matches!(output.ndim(), 2 | 3) && row >= output.shape()[0] {
        anyhow::bail!(
            "Model output has {} batch rows, row {} requested",
            output.shape()[0],
            row
        );
    }

    match output.ndim() {
        2 => Ok(output.index_axis(Axis(0), row).iter().copied().collect()),
        3 => {
            let tokens = output.index_axis(Axis(0), row); // [seq_len, hidden_dim]
            let seq_len = tokens.shape()[0].min(attention_mask.len());
            let hidden_dim = tokens.shape()[1];

            let mut pooled = vec![0.0f32; hidden_dim];
            let mut sum_mask = 0.0f32;

            for i in 0..seq_len {
                let mask_value = attention_mask[i] as f32;
                sum_mask += mask_value;
                for (j, slot) in pooled.iter_mut().enumerate() {
                    *slot += tokens[[i, j]] * mask_value;
                }
            }

            for val in &mut pooled {
                *val /= sum_mask.max(1e-9);
            }

            Ok(pooled)
        }
        _ => anyhow::bail!(
            "Model outputs unexpected shape: {:?} (expected [batch, hidden] or [batch, seq_len, hidden])",
            output.shape()
        ),
    }
}
