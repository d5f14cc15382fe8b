// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Micro-batching in front of a forward pass.
//!
//! Every call still carries exactly one query. A single worker task owns
//! the encoder; when it wakes it drains whatever is already queued, up to
//! `batch_size` queries, and runs them through one forward pass. It never
//! waits for more work to arrive, so an idle gateway adds no latency.

use super::{l2_normalize, BatchForward, Device, EncodeOptions, QueryEncoder};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Pending queries before callers start waiting on the queue itself
const QUEUE_DEPTH: usize = 1024;

struct Job {
    text: String,
    reply: oneshot::Sender<Result<Vec<f32>>>,
}

pub struct MicroBatcher {
    sender: mpsc::Sender<Job>,
    dimension: usize,
    device: Device,
    batch_size: usize,
}

impl std::fmt::Debug for MicroBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroBatcher")
            .field("dimension", &self.dimension)
            .field("device", &self.device)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl MicroBatcher {
    /// Starts the worker task. Must be called inside a tokio runtime.
    pub fn spawn<E>(encoder: Arc<E>, batch_size: usize) -> Self
    where
        E: BatchForward + QueryEncoder,
    {
        let batch_size = batch_size.max(1);
        let dimension = encoder.dimension();
        let device = encoder.device();
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);

        info!("Micro-batching up to {} queued queries per forward pass", batch_size);
        tokio::spawn(run_worker(encoder, receiver, batch_size));

        Self {
            sender,
            dimension,
            device,
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

async fn run_worker<E: BatchForward>(
    encoder: Arc<E>,
    mut receiver: mpsc::Receiver<Job>,
    batch_size: usize,
) {
    while let Some(first) = receiver.recv().await {
        let mut jobs = vec![first];
        while jobs.len() < batch_size {
            match receiver.try_recv() {
                Ok(job) => jobs.push(job),
                Err(_) => break,
            }
        }

        let (texts, replies): (Vec<String>, Vec<_>) =
            jobs.into_iter().map(|job| (job.text, job.reply)).unzip();
        debug!("Forward pass over {} queued queries", texts.len());

        let model = Arc::clone(&encoder);
        let outcome = tokio::task::spawn_blocking(move || model.forward_batch(&texts))
            .await
            .map_err(|e| anyhow!("Inference task failed: {}", e))
            .and_then(|result| result);

        match outcome {
            Ok(embeddings) if embeddings.len() == replies.len() => {
                for (reply, embedding) in replies.into_iter().zip(embeddings) {
                    // Caller may have gone away; nothing to do then
                    let _ = reply.send(Ok(embedding));
                }
            }
            Ok(embeddings) => {
                let message = format!(
                    "Forward pass returned {} vectors for {} queries",
                    embeddings.len(),
                    replies.len()
                );
                error!("{}", message);
                fail_all(replies, &message);
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Batched forward pass failed: {}", message);
                fail_all(replies, &message);
            }
        }
    }

    debug!("Micro-batching worker stopped");
}

fn fail_all(replies: Vec<oneshot::Sender<Result<Vec<f32>>>>, message: &str) {
    for reply in replies {
        let _ = reply.send(Err(anyhow::Error::msg(message.to_string())));
    }
}

#[async_trait]
impl QueryEncoder for MicroBatcher {
    async fn encode(&self, text: &str, options: &EncodeOptions) -> Result<Vec<f32>> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Job {
                text: text.to_owned(),
                reply,
            })
            .await
            .map_err(|_| anyhow!("Micro-batching worker is not running"))?;

        let mut embedding = response
            .await
            .context("Micro-batching worker dropped the query")??;

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
