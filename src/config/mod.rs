// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Process configuration.
//!
//! Every value is read once at startup from the command line, falling back
//! to environment variables (and a `.env` file loaded by `main`). Nothing
//! here can change while the process is serving.

pub mod mode;

pub use mode::DeploymentMode;

use crate::embeddings::{EncodeOptions, EncoderBackend, ModelConfig, ThreadPolicy};
use crate::inference::{ProxyConfig, ReadinessPolicy};
use anyhow::{anyhow, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_MODEL_NAME: &str = "modernbert-embed-base_finetune_512";
pub const DEFAULT_PROVIDER: &str = "FreeLawProject";
pub const DEFAULT_DIMENSIONS: usize = 768;
pub const DEFAULT_MAX_TOKENS: usize = 8192;

/// Query embedding gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "inception-gateway")]
#[command(version)]
#[command(about = "Serves search-query embeddings over HTTP", long_about = None)]
pub struct Args {
    /// Deployment mode
    #[arg(long, env = "DEPLOYMENT_MODE", value_enum, default_value_t = DeploymentMode::AlwaysOn)]
    pub mode: DeploymentMode,

    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Model identifier reported in responses
    #[arg(long, env = "MODEL_NAME", default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,

    /// Path to the ONNX model file
    #[arg(
        long,
        env = "MODEL_PATH",
        default_value = "./models/modernbert-embed-base-onnx/model.onnx"
    )]
    pub model_path: PathBuf,

    /// Path to tokenizer.json
    #[arg(
        long,
        env = "TOKENIZER_PATH",
        default_value = "./models/modernbert-embed-base-onnx/tokenizer.json"
    )]
    pub tokenizer_path: PathBuf,

    /// Encoder implementation
    #[arg(long, env = "ENCODER_BACKEND", value_enum, default_value_t = EncoderBackend::Onnx)]
    pub backend: EncoderBackend,

    /// Embedding dimensionality of the deployed model
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_DIMENSIONS)]
    pub dimensions: usize,

    /// Token limit; longer input is truncated by the tokenizer
    #[arg(long, env = "MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: usize,

    /// L2-normalize every embedding
    #[arg(long, env = "EMBEDDING_NORMALIZE")]
    pub normalize: bool,

    /// Sequences per forward pass
    #[arg(long, env = "BATCH_SIZE", default_value_t = 1)]
    pub batch_size: usize,

    /// Override intra-op threads (always-on mode)
    #[arg(long, env = "INTRA_OP_THREADS")]
    pub intra_threads: Option<usize>,

    /// Override inter-op threads (always-on mode)
    #[arg(long, env = "INTER_OP_THREADS")]
    pub inter_threads: Option<usize>,

    /// Model provider label for /info
    #[arg(long, env = "MODEL_PROVIDER", default_value = DEFAULT_PROVIDER)]
    pub provider: String,

    /// Sibling process base URL (proxy mode)
    #[arg(long, env = "UPSTREAM_URL", default_value = "http://127.0.0.1:8001")]
    pub upstream_url: Url,

    /// Sibling's embedding route
    #[arg(long, env = "UPSTREAM_EMBED_PATH", default_value = "/")]
    pub upstream_embed_path: String,

    /// Sibling's health route
    #[arg(long, env = "UPSTREAM_HEALTH_PATH", default_value = "/health")]
    pub upstream_health_path: String,

    /// Timeout for a forwarded embedding call, in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// Timeout for one sibling health probe, in milliseconds
    #[arg(long, env = "UPSTREAM_PROBE_TIMEOUT_MS", default_value_t = 2000)]
    pub upstream_probe_timeout_ms: u64,

    /// Startup readiness probes before serving anyway
    #[arg(long, env = "READINESS_ATTEMPTS", default_value_t = 10)]
    pub readiness_attempts: u32,

    /// First readiness backoff delay, in milliseconds
    #[arg(long, env = "READINESS_BASE_DELAY_MS", default_value_t = 500)]
    pub readiness_base_delay_ms: u64,

    /// Cap on a single readiness backoff delay, in milliseconds
    #[arg(long, env = "READINESS_MAX_DELAY_MS", default_value_t = 8000)]
    pub readiness_max_delay_ms: u64,

    /// Requests admitted concurrently; unlimited when unset
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS")]
    pub max_concurrent_requests: Option<usize>,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: DeploymentMode,
    pub listen_addr: SocketAddr,
    pub model: ModelConfig,
    pub provider: String,
    pub proxy: ProxyConfig,
    pub readiness: ReadinessPolicy,
    pub max_concurrent_requests: Option<usize>,
}

impl Args {
    pub fn into_config(self) -> Result<GatewayConfig> {
        if self.dimensions == 0 {
            return Err(anyhow!("Embedding dimensions must be greater than 0"));
        }
        if self.max_tokens == 0 {
            return Err(anyhow!("Max tokens must be greater than 0"));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(anyhow!("Upstream timeout must be greater than 0"));
        }
        if self.readiness_attempts == 0 {
            return Err(anyhow!("Readiness attempts must be at least 1"));
        }
        if self.max_concurrent_requests == Some(0) {
            return Err(anyhow!("Max concurrent requests must be greater than 0"));
        }

        let options = EncodeOptions::new(self.normalize, self.batch_size)?;

        let threads = self.mode.tunes_threads().then(|| {
            ThreadPolicy::detect().with_overrides(self.intra_threads, self.inter_threads)
        });

        let model = ModelConfig {
            name: self.model_name,
            model_path: self.model_path,
            tokenizer_path: self.tokenizer_path,
            dimensions: self.dimensions,
            max_tokens: self.max_tokens,
            backend: self.backend,
            prefer_accelerator: self.mode.prefers_accelerator(),
            threads,
            options,
        };

        let proxy = ProxyConfig {
            upstream_url: self.upstream_url,
            embed_path: self.upstream_embed_path,
            health_path: self.upstream_health_path,
            request_timeout: Duration::from_secs(self.upstream_timeout_secs),
            probe_timeout: Duration::from_millis(self.upstream_probe_timeout_ms),
            dimensions: self.dimensions,
        };

        let readiness = ReadinessPolicy {
            max_attempts: self.readiness_attempts,
            base_delay: Duration::from_millis(self.readiness_base_delay_ms),
            max_delay: Duration::from_millis(self.readiness_max_delay_ms),
        };

        Ok(GatewayConfig {
            mode: self.mode,
            listen_addr: SocketAddr::new(self.host, self.port),
            model,
            provider: self.provider,
            proxy,
            readiness,
            max_concurrent_requests: self.max_concurrent_requests,
        })
    }
}
