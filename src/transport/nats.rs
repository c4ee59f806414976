// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS transport
//!
//! Controller topics are `/`-delimited; NATS subjects are `.`-delimited, so
//! `gesha/temperature/boiler` travels as `gesha.temperature.boiler`.
//!
//! Core NATS has no retained messages and no per-message QoS. Acknowledged
//! QoS levels flush the connection before returning; retain requests are
//! logged and otherwise ignored.

use async_nats::{Client, ConnectOptions, Event};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EventReceiver, EventSender, PublishOptions, Transport, TransportEvent};
use crate::config::TelemetryConfig;
use crate::errors::{TelemetryError, TelemetryResult};

/// Convert a `/`-delimited topic into a NATS subject
pub fn topic_to_subject(topic: &str) -> String {
    topic.replace('/', ".")
}

/// Convert a NATS subject back into a `/`-delimited topic
pub fn subject_to_topic(subject: &str) -> String {
    subject.replace('.', "/")
}

/// Broker session over NATS core
pub struct NatsTransport {
    client: Client,
    events: EventSender,
    connected: Arc<AtomicBool>,
    /// Forwarding task per subscribed topic; aborting it drops the subscriber
    subscriptions: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl NatsTransport {
    /// Connect to the servers listed in `config`
    pub async fn connect(config: &TelemetryConfig) -> TelemetryResult<(Self, EventReceiver)> {
        let (events, receiver) = mpsc::channel(config.inbound_capacity.max(1));

        let status = events.clone();
        let connected = Arc::new(AtomicBool::new(false));
        let session = Arc::clone(&connected);
        let mut connect_options = ConnectOptions::new()
            .name(&config.client_name)
            .connection_timeout(config.connect_timeout)
            .event_callback(move |event| {
                let status = status.clone();
                let session = Arc::clone(&session);
                async move {
                    let forwarded = match event {
                        Event::Connected => {
                            session.store(true, Ordering::SeqCst);
                            Some(TransportEvent::Connected)
                        }
                        Event::Disconnected => {
                            session.store(false, Ordering::SeqCst);
                            Some(TransportEvent::Disconnected)
                        }
                        other => {
                            debug!(event = %other, "NATS connection event");
                            None
                        }
                    };

                    if let Some(event) = forwarded {
                        let _ = status.send(event).await;
                    }
                }
            });

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            connect_options = connect_options.user_and_password(user.clone(), pass.clone());
        }

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| TelemetryError::Connection(e.to_string()))?;

        info!("Connected to NATS at {:?}", config.servers);

        connected.store(true, Ordering::SeqCst);
        let _ = events.send(TransportEvent::Connected).await;

        let transport = Self {
            client,
            events,
            connected,
            subscriptions: Mutex::new(HashMap::new()),
        };

        Ok((transport, receiver))
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn subscribe(&self, topic: &str) -> TelemetryResult<()> {
        let subject = topic_to_subject(topic);

        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| TelemetryError::Subscribe(e.to_string()))?;

        let events = self.events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let event = TransportEvent::Message {
                    topic: subject_to_topic(&message.subject.to_string()),
                    payload: message.payload,
                };

                if events.send(event).await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.subscriptions().insert(topic.to_string(), forwarder) {
            previous.abort();
        }

        info!(subject = %subject, "Subscribed to subject");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> TelemetryResult<()> {
        let forwarder = self.subscriptions().remove(topic);

        match forwarder {
            Some(forwarder) => {
                forwarder.abort();
                debug!(topic, "Unsubscribed");
            }
            None => warn!(topic, "Unsubscribe for a topic that was never subscribed"),
        }

        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        options: PublishOptions,
    ) -> TelemetryResult<()> {
        let subject = topic_to_subject(topic);

        if options.retain {
            debug!(subject = %subject, "NATS core has no retained messages, publishing normally");
        }

        self.client
            .publish(subject.clone(), payload)
            .await
            .map_err(|e| TelemetryError::Publish(e.to_string()))?;

        if options.qos.is_acknowledged() {
            self.client
                .flush()
                .await
                .map_err(|e| TelemetryError::Publish(e.to_string()))?;
        }

        debug!("Published message to subject: {}", subject);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for NatsTransport {
    fn drop(&mut self) {
        for (_, forwarder) in self.subscriptions().drain() {
            forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_subject_mapping() {
        assert_eq!(
            topic_to_subject("gesha/temperature/history/0190"),
            "gesha.temperature.history.0190"
        );
        assert_eq!(subject_to_topic("gesha.config.ui_time_window"), "gesha/config/ui_time_window");
    }
}
