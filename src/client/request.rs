// Copyright (c) 2025 - Cowboy AI, Inc.
//! Correlated history requests
//!
//! ```text
//! client                                   controller
//!   │ once(temperature/history/<id>)           │
//!   │── temperature/history/command {id..} ──▶│
//!   │◀──────── temperature/history/<id> ───────│
//! ```
//!
//! The response topic carries the correlation id, so the one-shot listener on
//! it is the whole correlation mechanism. The pending table exists so callers
//! can see what is in flight.

use std::time::Duration;

use super::ListenerId;
use crate::topics::Topic;

/// Which history a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Measurement rows
    Temperature,
    /// Completed shots
    Shot,
}

impl RequestKind {
    pub fn command_topic(&self) -> Topic {
        match self {
            RequestKind::Temperature => Topic::TemperatureHistoryCommand,
            RequestKind::Shot => Topic::ShotHistoryCommand,
        }
    }

    pub fn response_topic(&self, id: impl Into<String>) -> Topic {
        match self {
            RequestKind::Temperature => Topic::TemperatureHistory(id.into()),
            RequestKind::Shot => Topic::ShotHistory(id.into()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Temperature => "temperature",
            RequestKind::Shot => "shot",
        }
    }
}

/// A request waiting for its response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Correlation id
    pub id: String,
    pub kind: RequestKind,
    /// Epoch milliseconds when the request was issued
    pub created_at: i64,
    pub timeout: Duration,
    /// One-shot listener on the response topic
    pub listener: ListenerId,
}

impl PendingRequest {
    pub fn response_topic(&self) -> Topic {
        self.kind.response_topic(self.id.clone())
    }
}
