// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::config::{DeploymentMode, GatewayConfig};
use crate::embeddings::{EncoderBackend, ModelHandle, ThreadPolicy};
use crate::inference::proxy::UPSTREAM_DEVICE;
use crate::version;
use serde::Serialize;

/// Process-level facts attached to responses and reported by /health and
/// /info. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMetadata {
    pub model: String,
    pub dimensions: usize,
    pub max_tokens: usize,
    pub provider: String,
    /// Resolved device, or "upstream" when the sibling hosts the model
    pub device: String,
    pub hardware: String,
    pub mode: DeploymentMode,
    /// `None` when the sibling decides
    pub normalize: Option<bool>,
    pub batch_size: Option<usize>,
    pub threads: Option<ThreadPolicy>,
    /// `None` when the sibling decides, or for a hand-built handle
    pub backend: Option<EncoderBackend>,
    pub upstream_url: Option<String>,
    pub version: &'static str,
}

impl ServiceMetadata {
    /// Metadata for a process hosting the model itself
    pub fn for_model(
        handle: &ModelHandle,
        mode: DeploymentMode,
        provider: impl Into<String>,
    ) -> Self {
        let descriptor = handle.descriptor();
        let options = handle.options();
        Self {
            model: descriptor.name.clone(),
            dimensions: descriptor.dimensions,
            max_tokens: descriptor.max_tokens,
            provider: provider.into(),
            device: descriptor.device.to_string(),
            hardware: descriptor.device.hardware_label().to_string(),
            mode,
            normalize: Some(options.normalize),
            batch_size: Some(options.batch_size),
            threads: descriptor.threads,
            backend: descriptor.backend,
            upstream_url: None,
            version: version::VERSION_NUMBER,
        }
    }

    /// Metadata for a process forwarding to a sibling
    pub fn for_proxy(config: &GatewayConfig) -> Self {
        Self {
            model: config.model.name.clone(),
            dimensions: config.model.dimensions,
            max_tokens: config.model.max_tokens,
            provider: config.provider.clone(),
            device: UPSTREAM_DEVICE.to_string(),
            hardware: "Sibling process".to_string(),
            mode: DeploymentMode::Proxy,
            normalize: None,
            batch_size: None,
            threads: None,
            backend: None,
            upstream_url: Some(config.proxy.upstream_url.to_string()),
            version: version::VERSION_NUMBER,
        }
    }
}
