// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Inception embedding gateway

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-query-embeddings-2025-11-03";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-11-03";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "in-process-onnx",
    "cuda-with-cpu-fallback",
    "cpu-thread-budget",
    "sibling-proxy",
    "readiness-backoff",
    "optional-l2-normalize",
    "query-micro-batching",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Inception Gateway {} ({})", VERSION_NUMBER, BUILD_DATE)
}
