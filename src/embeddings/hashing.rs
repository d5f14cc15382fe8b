// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Deterministic offline encoder.
//!
//! Produces pseudo-random vectors seeded from a hash of the input text, so
//! the same text always maps to the same vector within and across runs.
//! Used for smoke-testing a deployment without model weights, and by the
//! test suite and benches.

use super::{l2_normalize, BatchForward, Device, EncodeOptions, QueryEncoder};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(anyhow!("Embedding dimension must be greater than 0"));
        }
        Ok(Self { dimension })
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut current_seed = hasher.finish();

        let mut embedding = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            // Linear congruential step, mixed with the position
            current_seed =
                (current_seed.wrapping_mul(1664525).wrapping_add(1013904223)) ^ (i as u64);

            // Map to [-1, 1]
            let value = (current_seed as f64 / u64::MAX as f64) * 2.0 - 1.0;
            embedding.push(value as f32);
        }
        embedding
    }
}

impl BatchForward for HashingEncoder {
    fn forward_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.generate(text)).collect())
    }
}

#[async_trait]
impl QueryEncoder for HashingEncoder {
    async fn encode(&self, text: &str, options: &EncodeOptions) -> Result<Vec<f32>> {
        let mut embedding = self.generate(text);
        if options.normalize {
            l2_normalize(&mut embedding);
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}
