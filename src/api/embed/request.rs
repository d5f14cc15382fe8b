// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! EmbeddingRequest type and request validation
//!
//! The body is checked by hand instead of through a derived extractor so
//! that a missing field, an empty string and a malformed body each map to
//! their own error kind.

use crate::api::GatewayError;
use crate::embeddings::QUERY_PREFIX;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Validated body of `POST /`
///
/// # Example
/// ```json
/// {"text": "landlord heating repair obligations"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Query text as sent by the caller, never blank
    pub text: String,
}

impl EmbeddingRequest {
    /// Builds a request, rejecting blank text
    pub fn new(text: impl Into<String>) -> Result<Self, GatewayError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(GatewayError::EmptyText);
        }
        Ok(Self { text })
    }

    /// Validates a raw request body
    ///
    /// # Validation Rules
    /// 1. Body must be a JSON object
    /// 2. `text` must be present
    /// 3. `text` must be a string that is non-empty after trimming;
    ///    `null` counts as empty
    pub fn from_payload(body: &[u8]) -> Result<Self, GatewayError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(GatewayError::missing_field("text"));
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidPayload(format!("malformed JSON: {}", e)))?;

        let object = payload.as_object().ok_or_else(|| {
            GatewayError::InvalidPayload("request body must be a JSON object".to_string())
        })?;

        match object.get("text") {
            None => Err(GatewayError::missing_field("text")),
            Some(Value::Null) => Err(GatewayError::EmptyText),
            Some(Value::String(text)) => Self::new(text.as_str()),
            Some(_) => Err(GatewayError::InvalidPayload(
                "'text' must be a string".to_string(),
            )),
        }
    }

    /// Text as the encoder expects it
    pub fn prefixed_text(&self) -> String {
        format!("{}{}", QUERY_PREFIX, self.text)
    }
}
