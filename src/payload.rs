// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inbound payload decoding
//!
//! The controller publishes numbers, JSON documents and bare strings (modes,
//! control methods, config values) on the same transport. Every payload is
//! first read as text and then parsed as JSON; when parsing fails the raw text
//! is kept. That fallback is a content type, not an error.

use serde::de::DeserializeOwned;
use std::fmt;
use tracing::trace;

use crate::errors::{TelemetryError, TelemetryResult};

/// A decoded message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Valid JSON, including bare numbers
    Json(serde_json::Value),
    /// Anything that was not JSON
    Text(String),
}

impl Payload {
    /// Decode raw transport bytes
    pub fn decode(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);

        match serde_json::from_str(&text) {
            Ok(value) => Payload::Json(value),
            Err(err) => {
                trace!(error = %err, "Payload is not JSON, keeping raw text");
                Payload::Text(text.into_owned())
            }
        }
    }

    /// Numeric value of the payload, if it is one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Payload::Json(value) => value.as_f64(),
            Payload::Text(text) => text.trim().parse().ok(),
        }
    }

    /// String value of the payload: a JSON string or the raw text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Json(serde_json::Value::String(s)) => Some(s),
            Payload::Json(_) => None,
            Payload::Text(text) => Some(text),
        }
    }

    /// Deserialize a JSON payload into `T`
    ///
    /// Text payloads and JSON of the wrong structure are shape errors.
    pub fn deserialize<T: DeserializeOwned>(&self) -> TelemetryResult<T> {
        match self {
            Payload::Json(value) => T::deserialize(value)
                .map_err(|err| TelemetryError::ShapeValidation(err.to_string())),
            Payload::Text(text) => Err(TelemetryError::ShapeValidation(format!(
                "expected JSON, got text: {text}"
            ))),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Json(value) => write!(f, "{value}"),
            Payload::Text(text) => f.write_str(text),
        }
    }
}
