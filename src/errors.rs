// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for telemetry operations
//!
//! Payloads that fail to parse as JSON are not errors: they are delivered as
//! [`Payload::Text`](crate::payload::Payload::Text). Connectivity loss is not
//! an error either; it is reported through
//! [`ConnectionStatus`](crate::client::ConnectionStatus).

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the controller
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Transport connection error
    #[error("Transport connection error: {0}")]
    Connection(String),

    /// Transport publish error
    #[error("Transport publish error: {0}")]
    Publish(String),

    /// Transport subscribe or unsubscribe error
    #[error("Transport subscribe error: {0}")]
    Subscribe(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A payload did not have the expected structure
    #[error("Unexpected payload shape: {0}")]
    ShapeValidation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A correlated request received no response before its deadline
    #[error("Request {id} timed out after {timeout:?}")]
    Timeout {
        /// Correlation id of the request
        id: String,
        /// Deadline the request was given
        timeout: Duration,
    },

    /// The response listener was removed before a response arrived
    #[error("Request {0} was abandoned before a response arrived")]
    RequestAbandoned(String),
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        TelemetryError::Serialization(err.to_string())
    }
}
