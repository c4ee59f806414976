// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topic-addressed stream client
//!
//! One [`StreamClient`] wraps one transport session. Subscriptions are
//! reference counted per topic: the first reference sends SUBSCRIBE, the last
//! release sends UNSUBSCRIBE, and everything in between is bookkeeping.
//!
//! ```text
//!  on(mode) ──┐                                   ┌──▶ handler A
//!  on(mode) ──┼─▶ refcount(gesha/mode) = 3  ...   ├──▶ handler B
//!  subscribe ─┘        │                          │
//!                      ▼                          │
//!              SUBSCRIBE gesha/mode        dispatcher task
//!                      │                          ▲
//!                      ▼                          │
//!                  Transport ───── TransportEvent ┘
//! ```
//!
//! A single dispatcher task consumes transport events in delivery order and
//! runs handlers synchronously. Handlers must not block.
//!
//! # Examples
//!
//! ```no_run
//! use gesha_telemetry::client::StreamClient;
//! use gesha_telemetry::config::TelemetryConfig;
//! use gesha_telemetry::measurement::{now_millis, HistoryQuery, TimeWindow};
//! use gesha_telemetry::topics::Topic;
//!
//! # async fn example() -> gesha_telemetry::errors::TelemetryResult<()> {
//! let client = StreamClient::connect(&TelemetryConfig::default()).await?;
//!
//! client
//!     .on(&Topic::Mode, |payload| println!("mode is now {payload}"))
//!     .await?;
//!
//! let rows = client
//!     .request_history(&HistoryQuery::trailing(TimeWindow::TenMinutes, now_millis()))
//!     .await?;
//! println!("{} measurements", rows.len());
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::TelemetryConfig;
use crate::errors::{TelemetryError, TelemetryResult};
use crate::measurement::{
    now_millis, ConfigCommand, ControlMethod, HistoryCommand, HistoryQuery, Measurement, Mode,
    Shot,
};
use crate::payload::Payload;
use crate::topics::{Topic, TopicNamespace};
use crate::transport::{self, EventReceiver, PublishOptions, Transport, TransportEvent};

pub mod manager;
mod registry;
pub mod request;

pub use manager::ConnectionManager;
pub use registry::{Handler, ListenerId};
pub use request::{PendingRequest, RequestKind};

use registry::Registry;

/// Broker session state as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    transport: Arc<dyn Transport>,
    namespace: TopicNamespace,
    registry: Mutex<Registry>,
    /// Topics the transport is subscribed to. Held across transport calls so
    /// SUBSCRIBE/UNSUBSCRIBE frames follow reference transitions in order.
    subscribed: tokio::sync::Mutex<HashSet<String>>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    status: watch::Sender<ConnectionStatus>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingRequest>> {
        lock(&self.pending)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            dispatcher.abort();
        }
    }
}

/// Handle to the shared connection
///
/// Cloning is cheap; all clones share one transport, one registry and one
/// dispatcher.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<Inner>,
}

/// Non-owning handle, for handlers that must not keep the client alive
#[derive(Clone)]
pub struct WeakStreamClient {
    inner: Weak<Inner>,
}

impl WeakStreamClient {
    pub fn upgrade(&self) -> Option<StreamClient> {
        self.inner.upgrade().map(|inner| StreamClient { inner })
    }
}

impl StreamClient {
    /// Open the transport selected by `config` and start dispatching
    pub async fn connect(config: &TelemetryConfig) -> TelemetryResult<Self> {
        let (transport, events) = transport::connect(config).await?;

        info!(
            transport = %config.transport,
            root = %config.topic_root,
            "Stream client started"
        );

        Ok(Self::new(
            transport,
            events,
            TopicNamespace::new(config.topic_root.as_str()),
        ))
    }

    /// Wrap an already open transport
    ///
    /// Spawns the dispatcher, so this must run inside a Tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        events: EventReceiver,
        namespace: TopicNamespace,
    ) -> Self {
        let initial = if transport.is_connected() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        let (status, _) = watch::channel(initial);

        let inner = Arc::new(Inner {
            transport,
            namespace,
            registry: Mutex::new(Registry::default()),
            subscribed: tokio::sync::Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
            status,
            dispatcher: Mutex::new(None),
        });

        let dispatcher = tokio::spawn(dispatch(Arc::downgrade(&inner), events));
        *lock(&inner.dispatcher) = Some(dispatcher);

        Self { inner }
    }

    pub fn downgrade(&self) -> WeakStreamClient {
        WeakStreamClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles share one connection
    pub fn same_connection(&self, other: &StreamClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn namespace(&self) -> &TopicNamespace {
        &self.inner.namespace
    }

    /// Take a reference on `topic`, subscribing on the first one
    pub async fn subscribe(&self, topic: &Topic) -> TelemetryResult<()> {
        let qualified = self.inner.namespace.qualify(topic);

        let mut subscribed = self.inner.subscribed.lock().await;
        let references = self.inner.registry().acquire(&qualified);

        if let Err(err) = self.ensure_subscribed(&mut subscribed, &qualified).await {
            self.inner.registry().release(&qualified);
            return Err(err);
        }

        trace!(topic = %qualified, references, "Subscription reference taken");
        Ok(())
    }

    /// Release a reference on `topic`, unsubscribing on the last one
    ///
    /// Releasing a topic that holds no reference does nothing.
    pub async fn unsubscribe(&self, topic: &Topic) -> TelemetryResult<()> {
        let qualified = self.inner.namespace.qualify(topic);

        let released = self.inner.registry().release(&qualified);
        match released {
            Some(references) => {
                trace!(topic = %qualified, references, "Subscription reference released");
                self.sync_subscription(&qualified).await
            }
            None => {
                debug!(topic = %qualified, "Unsubscribe without a bare reference, ignoring");
                Ok(())
            }
        }
    }

    /// Invoke `handler` for every message on `topic`
    ///
    /// The listener holds one subscription reference until [`off`](Self::off).
    pub async fn on<F>(&self, topic: &Topic, handler: F) -> TelemetryResult<ListenerId>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.listen(topic, Arc::new(handler), false).await
    }

    /// Invoke `handler` for the next message on `topic` only
    ///
    /// The listener is removed before it runs and its reference released.
    pub async fn once<F>(&self, topic: &Topic, handler: F) -> TelemetryResult<ListenerId>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.listen(topic, Arc::new(handler), true).await
    }

    /// Remove a listener
    ///
    /// Returns false when it was not registered, e.g. a one-shot listener that
    /// already fired.
    pub async fn off(&self, topic: &Topic, id: ListenerId) -> TelemetryResult<bool> {
        let qualified = self.inner.namespace.qualify(topic);

        let removed = self.inner.registry().detach(&qualified, id);
        if !removed {
            trace!(topic = %qualified, listener = %id, "Listener not registered");
            return Ok(false);
        }

        debug!(topic = %qualified, listener = %id, "Listener removed");
        self.sync_subscription(&qualified).await?;
        Ok(true)
    }

    /// Publish raw bytes on `topic`
    pub async fn publish(
        &self,
        topic: &Topic,
        payload: impl Into<Bytes>,
        options: PublishOptions,
    ) -> TelemetryResult<()> {
        let qualified = self.inner.namespace.qualify(topic);

        self.inner
            .transport
            .publish(&qualified, payload.into(), options)
            .await?;

        debug!(
            topic = %qualified,
            qos = options.qos.level(),
            retain = options.retain,
            "Published message"
        );
        Ok(())
    }

    /// Publish `message` serialized as JSON
    pub async fn publish_json<T>(
        &self,
        topic: &Topic,
        message: &T,
        options: PublishOptions,
    ) -> TelemetryResult<()>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(message)?;
        self.publish(topic, payload, options).await
    }

    pub async fn set_mode(&self, mode: Mode) -> TelemetryResult<()> {
        self.publish(&Topic::ModeSet, mode.as_str(), PublishOptions::command())
            .await
    }

    pub async fn set_control_method(&self, method: ControlMethod) -> TelemetryResult<()> {
        self.publish(
            &Topic::ControlMethodSet,
            method.as_str(),
            PublishOptions::command(),
        )
        .await
    }

    /// Set the boiler target temperature in °C
    pub async fn set_target_temperature(&self, celsius: f64) -> TelemetryResult<()> {
        self.publish(
            &Topic::TargetTemperatureSet,
            celsius.to_string(),
            PublishOptions::command(),
        )
        .await
    }

    /// Set the heater level directly
    pub async fn set_boiler_level(&self, level: f64) -> TelemetryResult<()> {
        self.publish(
            &Topic::BoilerLevelSet,
            level.to_string(),
            PublishOptions::command(),
        )
        .await
    }

    /// Change a controller configuration value
    ///
    /// The controller acknowledges by republishing `config/<key>`.
    pub async fn set_config(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> TelemetryResult<()> {
        let command = ConfigCommand {
            key: key.into(),
            value: value.into(),
        };

        self.publish_json(&Topic::ConfigSet, &command, PublishOptions::command())
            .await
    }

    /// Fetch measurement history for `query`
    pub async fn request_history(&self, query: &HistoryQuery) -> TelemetryResult<Vec<Measurement>> {
        self.request(RequestKind::Temperature, query).await
    }

    /// Fetch completed shots for `query`
    pub async fn request_shot_history(&self, query: &HistoryQuery) -> TelemetryResult<Vec<Shot>> {
        self.request(RequestKind::Shot, query).await
    }

    /// Receiver of connection status changes
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn listener_count(&self, topic: &Topic) -> usize {
        let qualified = self.inner.namespace.qualify(topic);
        self.inner.registry().listener_count(&qualified)
    }

    /// Whether `topic` holds at least one reference
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        let qualified = self.inner.namespace.qualify(topic);
        self.inner.registry().references(&qualified) > 0
    }

    /// Requests still waiting for a response, oldest first
    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        let mut pending: Vec<PendingRequest> = self.inner.pending().values().cloned().collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    async fn listen(
        &self,
        topic: &Topic,
        handler: Handler,
        once: bool,
    ) -> TelemetryResult<ListenerId> {
        let qualified = self.inner.namespace.qualify(topic);

        let mut subscribed = self.inner.subscribed.lock().await;
        let id = self.inner.registry().attach(&qualified, handler, once);

        if let Err(err) = self.ensure_subscribed(&mut subscribed, &qualified).await {
            self.inner.registry().detach(&qualified, id);
            return Err(err);
        }

        debug!(topic = %qualified, listener = %id, once, "Listener registered");
        Ok(id)
    }

    async fn ensure_subscribed(
        &self,
        subscribed: &mut HashSet<String>,
        qualified: &str,
    ) -> TelemetryResult<()> {
        if subscribed.contains(qualified) {
            return Ok(());
        }

        self.inner.transport.subscribe(qualified).await?;
        subscribed.insert(qualified.to_string());

        debug!(topic = %qualified, "First reference, subscribed");
        Ok(())
    }

    /// Unsubscribe the transport once `qualified` holds no reference
    async fn sync_subscription(&self, qualified: &str) -> TelemetryResult<()> {
        let mut subscribed = self.inner.subscribed.lock().await;
        let references = self.inner.registry().references(qualified);

        if references == 0 && subscribed.remove(qualified) {
            self.inner.transport.unsubscribe(qualified).await?;
            debug!(topic = %qualified, "Last reference released, unsubscribed");
        }

        Ok(())
    }

    async fn request<T>(&self, kind: RequestKind, query: &HistoryQuery) -> TelemetryResult<T>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let deadline = started + query.timeout;
        let id = Uuid::now_v7().to_string();
        let response_topic = kind.response_topic(id.clone());

        let (sender, receiver) = oneshot::channel::<Payload>();
        let slot = Mutex::new(Some(sender));
        let listener = self
            .once(&response_topic, move |payload| {
                if let Some(sender) = lock(&slot).take() {
                    let _ = sender.send(payload.clone());
                }
            })
            .await?;

        self.inner.pending().insert(
            id.clone(),
            PendingRequest {
                id: id.clone(),
                kind,
                created_at: now_millis(),
                timeout: query.timeout,
                listener,
            },
        );

        let command = HistoryCommand::new(id.clone(), query);
        if let Err(err) = self
            .publish_json(&kind.command_topic(), &command, PublishOptions::command())
            .await
        {
            self.abandon(&response_topic, listener, &id).await;
            return Err(err);
        }

        info!(
            request_id = %id,
            kind = kind.as_str(),
            from = query.from,
            to = query.to,
            "History requested"
        );

        let outcome = tokio::time::timeout_at(deadline, receiver).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(payload)) => {
                self.inner.pending().remove(&id);
                debug!(request_id = %id, elapsed_ms, "History response received");

                payload.deserialize().map_err(|err| {
                    warn!(request_id = %id, error = %err, "Malformed history response");
                    err
                })
            }
            Ok(Err(_)) => {
                self.inner.pending().remove(&id);
                warn!(request_id = %id, elapsed_ms, "Response listener removed before a response");
                Err(TelemetryError::RequestAbandoned(id))
            }
            Err(_) => {
                self.abandon(&response_topic, listener, &id).await;
                warn!(
                    request_id = %id,
                    elapsed_ms,
                    timeout_ms = query.timeout.as_millis() as u64,
                    "History request timed out"
                );
                Err(TelemetryError::Timeout {
                    id,
                    timeout: query.timeout,
                })
            }
        }
    }

    /// Drop every trace of a request that will not complete
    async fn abandon(&self, response_topic: &Topic, listener: ListenerId, id: &str) {
        self.inner.pending().remove(id);

        if let Err(err) = self.off(response_topic, listener).await {
            error!(request_id = %id, error = %err, "Failed to release response topic");
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        let changed = self.inner.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        if !changed {
            return;
        }

        match status {
            ConnectionStatus::Connected => info!("Connection established"),
            ConnectionStatus::Disconnected => {
                let in_flight = self.inner.pending().len();
                warn!(in_flight, "Connection lost, pending requests keep their deadlines");
            }
        }
    }

    async fn route(&self, topic: &str, bytes: &Bytes) {
        if self.inner.namespace.parse(topic).is_none() {
            trace!(topic, "Ignoring message on unknown topic");
            return;
        }

        let dispatch = self.inner.registry().dispatch(topic);

        if dispatch.handlers.is_empty() {
            trace!(topic, "No listeners for message");
        } else {
            let payload = Payload::decode(bytes);
            trace!(topic, listeners = dispatch.handlers.len(), "Routing message");

            for handler in &dispatch.handlers {
                handler(&payload);
            }
        }

        if dispatch.fired_once > 0 {
            if let Err(err) = self.sync_subscription(topic).await {
                error!(topic, error = %err, "Failed to release one-shot subscription");
            }
        }
    }
}

async fn dispatch(inner: Weak<Inner>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let client = StreamClient { inner };

        match event {
            TransportEvent::Message { topic, payload } => client.route(&topic, &payload).await,
            TransportEvent::Connected => client.set_status(ConnectionStatus::Connected),
            TransportEvent::Disconnected => client.set_status(ConnectionStatus::Disconnected),
        }
    }

    debug!("Dispatcher stopped");
}
