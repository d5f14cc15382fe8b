// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};
use std::fmt;

/// How this process serves embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    /// Autoscaled, accelerator-backed; pays a cold start per new instance
    Accelerated,
    /// Single long-lived CPU process with a tuned thread budget
    AlwaysOn,
    /// Forwards to a sibling process that hosts the model
    Proxy,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Accelerated => "accelerated",
            DeploymentMode::AlwaysOn => "always-on",
            DeploymentMode::Proxy => "proxy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeploymentMode::Accelerated => "Autoscaled accelerator (cold starts)",
            DeploymentMode::AlwaysOn => "Always-on CPU (no cold starts)",
            DeploymentMode::Proxy => "Proxy to sibling model process",
        }
    }

    /// Whether the model is loaded into this process
    pub fn hosts_model(&self) -> bool {
        !matches!(self, DeploymentMode::Proxy)
    }

    pub fn prefers_accelerator(&self) -> bool {
        matches!(self, DeploymentMode::Accelerated)
    }

    /// CPU thread budget is only tuned for the always-on deployment
    pub fn tunes_threads(&self) -> bool {
        matches!(self, DeploymentMode::AlwaysOn)
    }

    pub fn cold_start(&self) -> bool {
        matches!(self, DeploymentMode::Accelerated)
    }

    pub fn always_on(&self) -> bool {
        matches!(self, DeploymentMode::AlwaysOn)
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
