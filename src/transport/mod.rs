// Copyright (c) 2025 - Cowboy AI, Inc.
//! Publish/subscribe transports
//!
//! A transport owns one broker session. Outbound operations go through the
//! [`Transport`] trait; inbound traffic and connectivity changes are delivered
//! in order on the [`TransportEvent`] channel handed out when the transport is
//! created.
//!
//! ```text
//!                 subscribe / unsubscribe / publish
//! StreamClient ──────────────────────────────────────▶ Transport ──▶ broker
//!      ▲                                                   │
//!      └──────────── mpsc::Receiver<TransportEvent> ◀──────┘
//! ```
//!
//! Transports deal in fully qualified topic strings (`gesha/mode`); topic
//! typing and reference counting live in the client.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{TelemetryConfig, TransportKind};
use crate::errors::TelemetryResult;

pub mod memory;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod nats;

pub use memory::{Frame, MemoryTransport};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;
pub use nats::NatsTransport;

/// Delivery guarantee requested for a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget (0)
    #[default]
    AtMostOnce,
    /// Acknowledged, possibly duplicated (1)
    AtLeastOnce,
    /// Acknowledged exactly once (2)
    ExactlyOnce,
}

impl QoS {
    pub fn level(&self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }

    /// Whether the publisher waits for the broker before returning
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, QoS::AtMostOnce)
    }
}

/// Options for a single publish
///
/// The client never retries on top of these; delivery is the transport's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishOptions {
    /// Keep the message as the topic's last value for late subscribers
    pub retain: bool,
    pub qos: QoS,
}

impl PublishOptions {
    /// Options used for controller commands: not retained, exactly once
    pub fn command() -> Self {
        Self {
            retain: false,
            qos: QoS::ExactlyOnce,
        }
    }

    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }
}

/// Something that happened on the broker session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A message arrived on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// The session (re)connected
    Connected,
    /// The session was lost
    Disconnected,
}

/// Sender half used by transports to report events
pub type EventSender = mpsc::Sender<TransportEvent>;

/// Receiver half consumed by the client's dispatcher
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// One broker session
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start receiving messages published on `topic`
    async fn subscribe(&self, topic: &str) -> TelemetryResult<()>;

    /// Stop receiving messages published on `topic`
    async fn unsubscribe(&self, topic: &str) -> TelemetryResult<()>;

    /// Publish `payload` on `topic`
    ///
    /// Returns once the transport accepted the message. For QoS at least
    /// once, NATS also flushes to the server; MQTT only queues the packet and
    /// its event loop completes the acknowledgement.
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        options: PublishOptions,
    ) -> TelemetryResult<()>;

    /// Current session state
    fn is_connected(&self) -> bool;
}

/// Open the transport selected by `config`
pub async fn connect(
    config: &TelemetryConfig,
) -> TelemetryResult<(Arc<dyn Transport>, EventReceiver)> {
    match config.transport {
        TransportKind::Nats => {
            let (transport, events) = NatsTransport::connect(config).await?;
            let transport: Arc<dyn Transport> = Arc::new(transport);
            Ok((transport, events))
        }
        #[cfg(feature = "mqtt")]
        TransportKind::Mqtt => {
            let (transport, events) = MqttTransport::connect(config)?;
            let transport: Arc<dyn Transport> = Arc::new(transport);
            Ok((transport, events))
        }
        #[cfg(not(feature = "mqtt"))]
        TransportKind::Mqtt => Err(crate::errors::TelemetryError::Configuration(
            "MQTT support requires the `mqtt` feature".to_string(),
        )),
        TransportKind::Memory => {
            let (transport, events) = MemoryTransport::new(config.inbound_capacity);
            let transport: Arc<dyn Transport> = Arc::new(transport);
            Ok((transport, events))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_options_default() {
        let options = PublishOptions::default();

        assert!(!options.retain);
        assert_eq!(options.qos, QoS::AtMostOnce);
        assert!(!options.qos.is_acknowledged());
    }

    #[test]
    fn test_command_options() {
        let options = PublishOptions::command();

        assert!(!options.retain);
        assert_eq!(options.qos.level(), 2);
        assert!(options.qos.is_acknowledged());
    }
}
