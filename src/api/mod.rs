// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod embed;
pub mod errors;
pub mod health;
pub mod http_server;
pub mod metadata;

pub use embed::{embed_query_handler, EmbeddingRequest, EmbeddingResponse};
pub use errors::{ErrorResponse, GatewayError};
pub use health::{HealthResponse, InfoResponse, UpstreamHealth};
pub use http_server::{create_app, start_server, AppState};
pub use metadata::ServiceMetadata;
