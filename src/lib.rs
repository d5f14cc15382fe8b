// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod embeddings;
pub mod inference;
pub mod startup;
pub mod version;

pub use api::{create_app, start_server, AppState, GatewayError, ServiceMetadata};
pub use config::{Args, DeploymentMode, GatewayConfig};
pub use embeddings::{EncodeOptions, ModelHandle, QueryEncoder};
pub use inference::{InProcessAdapter, InferenceAdapter, ProxyAdapter};
