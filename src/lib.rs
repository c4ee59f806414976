// Copyright (c) 2025 - Cowboy AI, Inc.
//! Streaming telemetry client for the gesha espresso controller
//!
//! This crate receives the controller's publish/subscribe stream, reconciles
//! it with on-demand history backfills, and keeps a bounded, chronologically
//! consistent view of recent measurements for a rendering layer.
//!
//! - [`buffer`]: fixed-capacity ring buffer
//! - [`intervals`]: active interval (duty cycle) extraction
//! - [`client`]: topic-addressed stream client with request correlation
//! - [`reconcile`] and [`monitor`]: live/historical merging

pub mod buffer;
pub mod client;
pub mod config;
pub mod errors;
pub mod intervals;
pub mod measurement;
pub mod monitor;
pub mod payload;
pub mod reconcile;
pub mod topics;
pub mod transport;

// Re-export commonly used types
pub use buffer::RingBuffer;
pub use client::{ConnectionManager, ConnectionStatus, ListenerId, StreamClient};
pub use config::{TelemetryConfig, TransportKind};
pub use errors::{TelemetryError, TelemetryResult};
pub use intervals::{active_intervals_historical, active_intervals_live, Interval};
pub use measurement::{HistoryQuery, Measurement, TimeWindow, ValueChange};
pub use monitor::TelemetryMonitor;
pub use payload::Payload;
pub use topics::{Signal, Topic, TopicNamespace};
pub use transport::{PublishOptions, QoS, Transport};
