// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding endpoint: request validation, handler, response composition.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::embed_query_handler;
pub use request::EmbeddingRequest;
pub use response::EmbeddingResponse;
