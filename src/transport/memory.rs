// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process loopback broker
//!
//! Behaves like a single-client broker: publishes are looped back to matching
//! subscriptions, retained messages are replayed on subscribe, and an optional
//! responder can answer publishes the way the controller answers commands.
//! Every outbound operation is recorded as a [`Frame`] so callers can assert
//! on exactly what would have gone over the wire.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{EventReceiver, EventSender, PublishOptions, Transport, TransportEvent};
use crate::errors::TelemetryResult;

/// One outbound operation seen by the broker
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Subscribe(String),
    Unsubscribe(String),
    Publish {
        topic: String,
        payload: Bytes,
        options: PublishOptions,
    },
}

/// Answers a publish with messages to deliver back
type Responder = Arc<dyn Fn(&str, &Bytes) -> Vec<(String, Bytes)> + Send + Sync>;

#[derive(Default)]
struct BrokerState {
    subscriptions: HashSet<String>,
    retained: HashMap<String, Bytes>,
    frames: Vec<Frame>,
    responder: Option<Responder>,
}

struct Broker {
    state: Mutex<BrokerState>,
    events: EventSender,
    connected: AtomicBool,
}

impl Broker {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, topic: &str, payload: Bytes) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            trace!(topic, "Broker offline, dropping message");
            return false;
        }

        if !self.state().subscriptions.contains(topic) {
            trace!(topic, "No subscription, dropping message");
            return false;
        }

        let event = TransportEvent::Message {
            topic: topic.to_string(),
            payload,
        };

        match self.events.try_send(event) {
            Ok(()) => true,
            Err(err) => {
                warn!(topic, error = %err, "Inbound queue rejected message");
                false
            }
        }
    }
}

/// Loopback transport for tests and offline runs
#[derive(Clone)]
pub struct MemoryTransport {
    broker: Arc<Broker>,
}

impl MemoryTransport {
    /// Create a connected broker with an inbound queue of `capacity` events
    pub fn new(capacity: usize) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::channel(capacity.max(1));

        let transport = Self {
            broker: Arc::new(Broker {
                state: Mutex::new(BrokerState::default()),
                events,
                connected: AtomicBool::new(true),
            }),
        };

        (transport, receiver)
    }

    /// Deliver a message as if the controller had published it
    ///
    /// Returns whether a subscription received it.
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        self.broker.deliver(topic, payload.into())
    }

    /// Store a retained message and deliver it to a current subscription
    pub fn retain(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        let payload = payload.into();
        self.broker
            .state()
            .retained
            .insert(topic.to_string(), payload.clone());
        self.broker.deliver(topic, payload)
    }

    /// Answer every publish with the messages `responder` returns
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&str, &Bytes) -> Vec<(String, Bytes)> + Send + Sync + 'static,
    {
        self.broker.state().responder = Some(Arc::new(responder));
    }

    /// Simulate the session going up or down
    ///
    /// While down, nothing is delivered.
    pub fn set_connected(&self, connected: bool) {
        let was = self.broker.connected.swap(connected, Ordering::SeqCst);
        if was == connected {
            return;
        }

        let event = if connected {
            TransportEvent::Connected
        } else {
            TransportEvent::Disconnected
        };

        if let Err(err) = self.broker.events.try_send(event) {
            warn!(error = %err, "Inbound queue rejected status change");
        }
    }

    /// Every outbound operation so far, in order
    pub fn frames(&self) -> Vec<Frame> {
        self.broker.state().frames.clone()
    }

    /// Number of SUBSCRIBE frames sent for `topic`
    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.broker
            .state()
            .frames
            .iter()
            .filter(|frame| matches!(frame, Frame::Subscribe(t) if t == topic))
            .count()
    }

    /// Payloads published on `topic`, in order
    pub fn published(&self, topic: &str) -> Vec<Bytes> {
        self.broker
            .state()
            .frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Publish { topic: t, payload, .. } if t == topic => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.broker.state().subscriptions.contains(topic)
    }

    /// Currently subscribed topics, sorted
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.broker.state().subscriptions.iter().cloned().collect();
        topics.sort();
        topics
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&self, topic: &str) -> TelemetryResult<()> {
        let retained = {
            let mut state = self.broker.state();
            state.frames.push(Frame::Subscribe(topic.to_string()));
            state.subscriptions.insert(topic.to_string());
            state.retained.get(topic).cloned()
        };

        debug!(topic, "Subscribed");

        if let Some(payload) = retained {
            self.broker.deliver(topic, payload);
        }

        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> TelemetryResult<()> {
        let mut state = self.broker.state();
        state.frames.push(Frame::Unsubscribe(topic.to_string()));
        state.subscriptions.remove(topic);

        debug!(topic, "Unsubscribed");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        options: PublishOptions,
    ) -> TelemetryResult<()> {
        let responder = {
            let mut state = self.broker.state();
            state.frames.push(Frame::Publish {
                topic: topic.to_string(),
                payload: payload.clone(),
                options,
            });
            if options.retain {
                state.retained.insert(topic.to_string(), payload.clone());
            }
            state.responder.clone()
        };

        self.broker.deliver(topic, payload.clone());

        if let Some(responder) = responder {
            if self.broker.connected.load(Ordering::SeqCst) {
                for (reply_topic, reply) in responder(topic, &payload) {
                    self.broker.deliver(&reply_topic, reply);
                }
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.broker.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_loops_back_to_subscribers() {
        let (transport, mut events) = MemoryTransport::new(8);
        transport.subscribe("gesha/mode").await.unwrap();

        transport
            .publish("gesha/mode", Bytes::from_static(b"idle"), PublishOptions::default())
            .await
            .unwrap();
        transport
            .publish("gesha/other", Bytes::from_static(b"x"), PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            TransportEvent::Message {
                topic: "gesha/mode".to_string(),
                payload: Bytes::from_static(b"idle"),
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retained_message_replayed_on_subscribe() {
        let (transport, mut events) = MemoryTransport::new(8);
        assert!(!transport.retain("gesha/config/ui_time_window", "60000"));

        transport.subscribe("gesha/config/ui_time_window").await.unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            TransportEvent::Message { payload, .. } if payload == "60000"
        ));
    }

    #[tokio::test]
    async fn test_responder_answers_publish() {
        let (transport, mut events) = MemoryTransport::new(8);
        transport.respond_with(|topic, _| {
            if topic == "ping" {
                vec![("pong".to_string(), Bytes::from_static(b"1"))]
            } else {
                Vec::new()
            }
        });
        transport.subscribe("pong").await.unwrap();

        transport
            .publish("ping", Bytes::new(), PublishOptions::command())
            .await
            .unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            TransportEvent::Message { topic, .. } if topic == "pong"
        ));
    }

    #[tokio::test]
    async fn test_offline_broker_delivers_nothing() {
        let (transport, mut events) = MemoryTransport::new(8);
        transport.subscribe("gesha/mode").await.unwrap();

        transport.set_connected(false);
        assert_eq!(events.try_recv().unwrap(), TransportEvent::Disconnected);
        assert!(!transport.inject("gesha/mode", "idle"));

        transport.set_connected(true);
        assert_eq!(events.try_recv().unwrap(), TransportEvent::Connected);
        assert!(transport.inject("gesha/mode", "idle"));
    }
}
