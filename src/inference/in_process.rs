// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! In-process strategy: the model lives in this process.

use super::{ensure_dimensions, Inference, InferenceAdapter, Readiness};
use crate::api::embed::EmbeddingRequest;
use crate::api::GatewayError;
use crate::embeddings::ModelHandle;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct InProcessAdapter {
    model: Arc<ModelHandle>,
}

impl InProcessAdapter {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl InferenceAdapter for InProcessAdapter {
    async fn infer(&self, request: &EmbeddingRequest) -> Result<Inference, GatewayError> {
        let embedding = self.model.encode(&request.prefixed_text()).await?;
        ensure_dimensions(&embedding, self.model.descriptor().dimensions)?;

        debug!("Encoded query in-process ({} values)", embedding.len());

        Ok(Inference {
            embedding,
            device: self.model.device().to_string(),
        })
    }

    async fn probe(&self) -> Readiness {
        // A handle only exists once loading has completed
        Readiness::Ready
    }
}
