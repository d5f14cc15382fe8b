// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Compute device binding and CPU thread budget for the model host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device the encoder is bound to for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// NVIDIA accelerator via the CUDA execution provider
    Cuda,
    /// General-purpose compute
    Cpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }

    /// Human-readable hardware label used by `/info`
    pub fn hardware_label(&self) -> &'static str {
        match self {
            Device::Cuda => "GPU (CUDA)",
            Device::Cpu => "CPU",
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread budget for CPU inference
///
/// Applied once when the ONNX session is built; never changed per request.
/// `intra_op` threads parallelise work inside a single kernel, `inter_op`
/// threads run independent kernels of the graph concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPolicy {
    pub intra_op: usize,
    pub inter_op: usize,
}

impl ThreadPolicy {
    /// Derives the budget from a logical CPU count:
    /// 2x CPUs for intra-op, half the CPUs (at least one) for inter-op.
    pub fn for_cpus(logical_cpus: usize) -> Self {
        let cpus = logical_cpus.max(1);
        Self {
            intra_op: cpus * 2,
            inter_op: (cpus / 2).max(1),
        }
    }

    /// Budget for the machine this process runs on
    pub fn detect() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::for_cpus(cpus)
    }

    /// Applies explicit overrides on top of the detected policy
    pub fn with_overrides(mut self, intra_op: Option<usize>, inter_op: Option<usize>) -> Self {
        if let Some(n) = intra_op {
            self.intra_op = n.max(1);
        }
        if let Some(n) = inter_op {
            self.inter_op = n.max(1);
        }
        self
    }

    /// Inter-op threads only take effect in parallel execution mode
    pub fn parallel_execution(&self) -> bool {
        self.inter_op > 1
    }
}
