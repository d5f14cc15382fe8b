// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Proxy strategy: the model is hosted by a sibling process.
//!
//! The sibling is another gateway running in-process, reachable over
//! loopback. Requests are forwarded with the caller's raw text; the
//! sibling applies the query prefix itself. This process never binds a
//! device of its own, so it reports `UPSTREAM_DEVICE` everywhere.

use super::{ensure_dimensions, Inference, InferenceAdapter, Readiness};
use crate::api::embed::EmbeddingRequest;
use crate::api::GatewayError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Device reported by a proxy in responses, `/health` and `/info`
pub const UPSTREAM_DEVICE: &str = "upstream";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Base address of the sibling, e.g. `http://127.0.0.1:8001`
    pub upstream_url: Url,
    /// Sibling's embedding route
    pub embed_path: String,
    /// Sibling's health route
    pub health_path: String,
    /// Bound on one forwarded embedding call
    pub request_timeout: Duration,
    /// Bound on one health probe
    pub probe_timeout: Duration,
    /// Expected vector length
    pub dimensions: usize,
}

/// Bounded exponential backoff for the startup readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl ReadinessPolicy {
    /// Delay after the given zero-based failed attempt: base * 2^attempt, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct UpstreamEmbedding {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ProxyAdapter {
    client: reqwest::Client,
    embed_url: Url,
    health_url: Url,
    config: ProxyConfig,
}

impl ProxyAdapter {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build upstream HTTP client")?;

        let embed_url = config
            .upstream_url
            .join(&config.embed_path)
            .with_context(|| format!("Invalid upstream embed path: {}", config.embed_path))?;
        let health_url = config
            .upstream_url
            .join(&config.health_path)
            .with_context(|| format!("Invalid upstream health path: {}", config.health_path))?;

        Ok(Self {
            client,
            embed_url,
            health_url,
            config,
        })
    }

    pub fn upstream_url(&self) -> &Url {
        &self.config.upstream_url
    }

    /// Polls the sibling's health route until it answers or the policy is
    /// exhausted. Returns whether the sibling became ready.
    pub async fn wait_until_ready(&self, policy: &ReadinessPolicy) -> bool {
        info!(
            "⏳ Waiting for upstream {} (up to {} attempts)",
            self.health_url, policy.max_attempts
        );

        for attempt in 0..policy.max_attempts {
            match self.probe().await {
                Readiness::Ready => {
                    info!(
                        "✅ Upstream ready after {} attempt(s): {}",
                        attempt + 1,
                        self.config.upstream_url
                    );
                    return true;
                }
                Readiness::Unavailable { detail } => {
                    if attempt + 1 < policy.max_attempts {
                        let delay = policy.delay_for(attempt);
                        warn!(
                            "Upstream not ready (attempt {}/{}): {}; retrying in {}ms",
                            attempt + 1,
                            policy.max_attempts,
                            detail,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(
                            "Upstream not ready (attempt {}/{}): {}",
                            attempt + 1,
                            policy.max_attempts,
                            detail
                        );
                    }
                }
            }
        }

        warn!(
            "⚠️  Upstream {} still unreachable; serving anyway, /health will report unhealthy",
            self.config.upstream_url
        );
        false
    }

    fn classify_transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout {
                timeout_ms: self.config.request_timeout.as_millis() as u64,
            }
        } else if err.is_connect() {
            GatewayError::UpstreamUnavailable(format!(
                "cannot connect to {}: {}",
                self.embed_url, err
            ))
        } else {
            GatewayError::UpstreamUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl InferenceAdapter for ProxyAdapter {
    async fn infer(&self, request: &EmbeddingRequest) -> Result<Inference, GatewayError> {
        let response = self
            .client
            .post(self.embed_url.clone())
            .json(&UpstreamRequest {
                text: &request.text,
            })
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                detail: extract_detail(&body),
            });
        }

        let payload: UpstreamEmbedding = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.classify_transport_error(e)
            } else {
                GatewayError::ModelInvocation(format!("Malformed upstream response: {}", e))
            }
        })?;

        ensure_dimensions(&payload.embedding, self.config.dimensions)?;
        debug!("Relayed {} values from upstream", payload.embedding.len());

        Ok(Inference {
            embedding: payload.embedding,
            device: UPSTREAM_DEVICE.to_string(),
        })
    }

    async fn probe(&self) -> Readiness {
        let result = self
            .client
            .get(self.health_url.clone())
            .timeout(self.config.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => Readiness::Ready,
            Ok(response) => Readiness::Unavailable {
                detail: format!("health check returned {}", response.status()),
            },
            Err(e) => Readiness::Unavailable {
                detail: e.to_string(),
            },
        }
    }
}

/// Pulls a human-readable reason out of an upstream error body
fn extract_detail(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message", "error"] {
            match map.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(serde_json::Value::Null) | None => continue,
                Some(other) => return other.to_string(),
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.to_string()
    }
}
