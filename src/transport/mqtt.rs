// Copyright (c) 2025 - Cowboy AI, Inc.
//! MQTT transport
//!
//! The controller's native broker protocol. The rumqttc event loop runs on
//! its own task and reconnects on failure; every CONNACK resubscribes the
//! topics currently held, since a clean session forgets them.

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{EventReceiver, EventSender, PublishOptions, QoS, Transport, TransportEvent};
use crate::config::TelemetryConfig;
use crate::errors::{TelemetryError, TelemetryResult};

const DEFAULT_PORT: u16 = 1883;
const KEEP_ALIVE: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 64;

type TopicSet = Arc<Mutex<HashSet<String>>>;

fn topics(set: &TopicSet) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Split `mqtt://host:port` into host and port
pub fn parse_server(server: &str) -> TelemetryResult<(String, u16)> {
    let address = server
        .strip_prefix("mqtt://")
        .or_else(|| server.strip_prefix("tcp://"))
        .unwrap_or(server)
        .trim_end_matches('/');

    // Credentials are configured separately
    let address = address.rsplit_once('@').map_or(address, |(_, host)| host);

    match address.rsplit_once(':') {
        Some((host, port)) => port
            .parse()
            .map(|port| (host.to_string(), port))
            .map_err(|_| TelemetryError::Configuration(format!("invalid MQTT port in {server}"))),
        None if !address.is_empty() => Ok((address.to_string(), DEFAULT_PORT)),
        None => Err(TelemetryError::Configuration(format!(
            "invalid MQTT server: {server}"
        ))),
    }
}

fn mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Broker session over MQTT 3.1.1
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    topics: TopicSet,
    event_loop: JoinHandle<()>,
}

impl MqttTransport {
    /// Start a session with the first server in `config`
    ///
    /// The connection itself is established by the event loop task; progress
    /// is reported as [`TransportEvent::Connected`].
    pub fn connect(config: &TelemetryConfig) -> TelemetryResult<(Self, EventReceiver)> {
        let server = config
            .servers
            .first()
            .ok_or_else(|| TelemetryError::Configuration("no MQTT server configured".to_string()))?;
        let (host, port) = parse_server(server)?;

        let mut options = MqttOptions::new(&config.client_name, host.clone(), port);
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (events, receiver) = mpsc::channel(config.inbound_capacity.max(1));

        let connected = Arc::new(AtomicBool::new(false));
        let topics = TopicSet::default();

        let event_loop = tokio::spawn(drive(
            event_loop,
            client.clone(),
            events,
            Arc::clone(&connected),
            Arc::clone(&topics),
        ));

        info!(host = %host, port, "Starting MQTT session");

        let transport = Self {
            client,
            connected,
            topics,
            event_loop,
        };

        Ok((transport, receiver))
    }
}

async fn drive(
    mut event_loop: EventLoop,
    client: AsyncClient,
    events: EventSender,
    connected: Arc<AtomicBool>,
    held: TopicSet,
) {
    loop {
        let forwarded = match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => Some(TransportEvent::Message {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
            }),
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                info!("Connected to MQTT broker");

                for topic in topics(&held).iter() {
                    if let Err(err) = client.try_subscribe(topic.clone(), rumqttc::QoS::AtLeastOnce) {
                        error!(topic = %topic, error = %err, "Failed to resubscribe");
                    }
                }

                Some(TransportEvent::Connected)
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                warn!("MQTT broker closed the session");
                Some(TransportEvent::Disconnected)
            }
            Ok(_) => None,
            Err(err) => {
                let was_connected = connected.swap(false, Ordering::SeqCst);
                if was_connected {
                    warn!(error = %err, "MQTT connection lost");
                } else {
                    debug!(error = %err, "MQTT connection attempt failed");
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
                was_connected.then_some(TransportEvent::Disconnected)
            }
        };

        if let Some(event) = forwarded {
            if !forward(&events, event) {
                debug!("Inbound queue closed, stopping MQTT event loop");
                break;
            }
        }
    }
}

/// Hand `event` to the dispatcher without waiting for queue space
///
/// The event loop must keep polling while a subscriber waits on it, so a
/// full queue drops the event. Returns false once the queue is closed.
fn forward(events: &EventSender, event: TransportEvent) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(?event, "Inbound queue full, dropping MQTT event");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, topic: &str) -> TelemetryResult<()> {
        topics(&self.topics).insert(topic.to_string());

        self.client
            .subscribe(topic, rumqttc::QoS::AtLeastOnce)
            .await
            .map_err(|e| TelemetryError::Subscribe(e.to_string()))?;

        debug!(topic, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> TelemetryResult<()> {
        topics(&self.topics).remove(topic);

        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| TelemetryError::Subscribe(e.to_string()))?;

        debug!(topic, "Unsubscribed");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        options: PublishOptions,
    ) -> TelemetryResult<()> {
        self.client
            .publish(topic, mqtt_qos(options.qos), options.retain, payload.to_vec())
            .await
            .map_err(|e| TelemetryError::Publish(e.to_string()))?;

        debug!(topic, qos = options.qos.level(), retain = options.retain, "Published");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}
