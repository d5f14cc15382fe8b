// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Turns a validated configuration into the state the router serves.

use crate::api::{AppState, ServiceMetadata};
use crate::config::{DeploymentMode, GatewayConfig};
use crate::embeddings::ModelHandle;
use crate::inference::{InProcessAdapter, InferenceAdapter, ProxyAdapter};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Loads the model or connects to the sibling, depending on the mode.
/// A model that fails to load is an error; the caller decides how to exit.
pub async fn build_state(config: &GatewayConfig) -> Result<AppState> {
    let (adapter, metadata) = if config.mode.hosts_model() {
        build_in_process(config)
            .await
            .context("Model failed to load")?
    } else {
        build_proxy(config).await?
    };

    info!(
        "Serving {} ({} dims) on {} via {}",
        metadata.model, metadata.dimensions, metadata.device, config.listen_addr
    );

    Ok(AppState::new(adapter, metadata))
}

async fn build_in_process(
    config: &GatewayConfig,
) -> Result<(Arc<dyn InferenceAdapter>, ServiceMetadata)> {
    info!("🧠 Loading embedding model {}...", config.model.name);

    let handle = ModelHandle::load(&config.model).await?;

    let descriptor = handle.descriptor();
    info!(
        "✅ Model loaded on {} ({})",
        descriptor.device,
        descriptor.device.hardware_label()
    );
    if let Some(threads) = descriptor.threads {
        info!(
            "   Threads: intra-op {}, inter-op {}",
            threads.intra_op, threads.inter_op
        );
    }
    if config.mode == DeploymentMode::Accelerated && !descriptor.device.is_accelerator() {
        warn!("Accelerated mode is running on CPU");
    }

    let metadata = ServiceMetadata::for_model(&handle, config.mode, config.provider.clone());
    let adapter: Arc<dyn InferenceAdapter> = Arc::new(InProcessAdapter::new(Arc::new(handle)));
    Ok((adapter, metadata))
}

async fn build_proxy(config: &GatewayConfig) -> Result<(Arc<dyn InferenceAdapter>, ServiceMetadata)> {
    info!("🔗 Forwarding to upstream {}...", config.proxy.upstream_url);

    let proxy = ProxyAdapter::new(config.proxy.clone())?;

    if proxy.wait_until_ready(&config.readiness).await {
        info!("✅ Upstream ready at {}", proxy.upstream_url());
    }

    let metadata = ServiceMetadata::for_proxy(config);
    let adapter: Arc<dyn InferenceAdapter> = Arc::new(proxy);
    Ok((adapter, metadata))
}
