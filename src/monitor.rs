// Copyright (c) 2025 - Cowboy AI, Inc.
//! Live telemetry view
//!
//! [`TelemetryMonitor`] keeps one bounded buffer per [`Signal`], fed by the
//! live stream and topped up by history backfills.
//!
//! ```text
//!                       live ValueChange
//! temperature/boiler ─────────────────────▶ push ──┐
//!                                                  ▼
//!                                          RingBuffer (per signal)
//!                                                  ▲
//! start / set_time_window / config change ──▶ backfill ──▶ reconcile_buffer
//! ```
//!
//! A backfill is started when the monitor starts, when the window is changed
//! locally, and when the controller reports a different `ui_time_window`.
//! Backfills run on their own tasks. Each carries a generation number and
//! its result is dropped if a newer backfill was started in the meantime.
//!
//! Merging happens under the buffer lock. Live samples that arrived while the
//! request was in flight are already in the buffer and win on timestamp
//! collisions; samples arriving afterwards are pushed on top of the merged
//! base.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::buffer::RingBuffer;
use crate::client::{ListenerId, StreamClient};
use crate::config::TelemetryConfig;
use crate::errors::TelemetryResult;
use crate::intervals::{active_intervals_live, Interval};
use crate::measurement::{now_millis, ControlMethod, HistoryQuery, Mode, TimeWindow, ValueChange};
use crate::payload::Payload;
use crate::reconcile::{reconcile_buffer, HistoricalSeries};
use crate::topics::{Signal, Topic, TIME_WINDOW_CONFIG_KEY};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ControllerState {
    mode: Option<Mode>,
    control_method: Option<ControlMethod>,
    target_temperature: Option<f64>,
}

struct MonitorState {
    client: StreamClient,
    buffers: HashMap<Signal, Mutex<RingBuffer<ValueChange>>>,
    window: Mutex<TimeWindow>,
    controller: Mutex<ControllerState>,
    generation: AtomicU64,
    in_flight: watch::Sender<usize>,
    request_timeout: Duration,
    bucket_size: Duration,
}

impl MonitorState {
    fn buffer(&self, signal: Signal) -> Option<MutexGuard<'_, RingBuffer<ValueChange>>> {
        self.buffers.get(&signal).map(lock)
    }

    /// Install `window`, returning whether it changed
    fn replace_window(&self, window: TimeWindow) -> bool {
        let mut current = lock(&self.window);
        if *current == window {
            return false;
        }
        *current = window;
        true
    }

    fn on_value(&self, signal: Signal, payload: &Payload) {
        match ValueChange::from_payload(payload, now_millis()) {
            Ok(change) => {
                if let Some(mut buffer) = self.buffer(signal) {
                    buffer.push(change);
                }
                trace!(signal = %signal, timestamp = change.timestamp, value = change.value, "Live sample");
            }
            Err(err) => warn!(signal = %signal, error = %err, "Discarding malformed live sample"),
        }
    }

    fn on_mode(&self, payload: &Payload) {
        match payload.as_str().map(str::parse::<Mode>) {
            Some(Ok(mode)) => lock(&self.controller).mode = Some(mode),
            _ => warn!(payload = %payload, "Discarding unknown mode"),
        }
    }

    fn on_control_method(&self, payload: &Payload) {
        match payload.as_str().map(str::parse::<ControlMethod>) {
            Some(Ok(method)) => lock(&self.controller).control_method = Some(method),
            _ => warn!(payload = %payload, "Discarding unknown control method"),
        }
    }

    fn on_target_temperature(&self, payload: &Payload) {
        match payload.as_f64() {
            Some(celsius) => lock(&self.controller).target_temperature = Some(celsius),
            None => warn!(payload = %payload, "Discarding non-numeric target temperature"),
        }
    }

    async fn backfill(&self, generation: u64, window: TimeWindow) -> TelemetryResult<usize> {
        let query = HistoryQuery::trailing(window, now_millis())
            .bucket_size(self.bucket_size.as_millis() as i64)
            .timeout(self.request_timeout);

        let measurements = self.client.request_history(&query).await?;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Backfill superseded, dropping result");
            return Ok(0);
        }

        let historical = HistoricalSeries::from_measurements(&measurements);
        let mut merged = 0;

        for (signal, series) in historical.populated() {
            if let Some(mut buffer) = self.buffer(signal) {
                let held = reconcile_buffer(&mut buffer, series);
                debug!(signal = %signal, historical = series.len(), held, "Merged history");
                merged += series.len();
            }
        }

        info!(
            generation,
            window_ms = window.as_millis(),
            rows = measurements.len(),
            merged,
            "History backfill complete"
        );
        Ok(merged)
    }
}

/// Start a backfill for `window` on its own task
fn spawn_backfill(state: &Arc<MonitorState>, window: TimeWindow) {
    let generation = state.generation.fetch_add(1, Ordering::SeqCst) + 1;
    state.in_flight.send_modify(|count| *count += 1);

    let state = Arc::clone(state);
    tokio::spawn(async move {
        if let Err(err) = state.backfill(generation, window).await {
            warn!(generation, error = %err, "History backfill failed");
        }
        state.in_flight.send_modify(|count| *count -= 1);
    });
}

fn on_time_window(state: &Weak<MonitorState>, payload: &Payload) {
    let Some(state) = state.upgrade() else {
        return;
    };

    match TimeWindow::try_from(payload) {
        Ok(window) if state.replace_window(window) => {
            info!(window_ms = window.as_millis(), "Controller changed the time window");
            spawn_backfill(&state, window);
        }
        Ok(_) => trace!("Time window unchanged"),
        Err(err) => warn!(error = %err, "Discarding invalid time window"),
    }
}

/// Bounded per-signal view of the controller's telemetry
///
/// Cheap to clone; clones share state. Listeners stay registered until
/// [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct TelemetryMonitor {
    state: Arc<MonitorState>,
    listeners: Arc<Mutex<Vec<(Topic, ListenerId)>>>,
}

impl TelemetryMonitor {
    /// Register live listeners on `client` and start the initial backfill
    pub async fn start(client: StreamClient, config: &TelemetryConfig) -> TelemetryResult<Self> {
        let buffers = Signal::ALL
            .into_iter()
            .map(|signal| (signal, Mutex::new(RingBuffer::new(config.buffer_capacity))))
            .collect();
        let (in_flight, _) = watch::channel(0);

        let state = Arc::new(MonitorState {
            client: client.clone(),
            buffers,
            window: Mutex::new(config.default_time_window),
            controller: Mutex::new(ControllerState::default()),
            generation: AtomicU64::new(0),
            in_flight,
            request_timeout: config.request_timeout,
            bucket_size: config.history_bucket_size,
        });

        let monitor = Self {
            state: Arc::clone(&state),
            listeners: Arc::new(Mutex::new(Vec::new())),
        };

        for signal in Signal::ALL {
            let weak = Arc::downgrade(&state);
            monitor
                .listen(Topic::Signal(signal), move |payload| {
                    if let Some(state) = weak.upgrade() {
                        state.on_value(signal, payload);
                    }
                })
                .await?;
        }

        let weak = Arc::downgrade(&state);
        monitor
            .listen(Topic::Mode, move |payload| {
                if let Some(state) = weak.upgrade() {
                    state.on_mode(payload);
                }
            })
            .await?;

        let weak = Arc::downgrade(&state);
        monitor
            .listen(Topic::ControlMethod, move |payload| {
                if let Some(state) = weak.upgrade() {
                    state.on_control_method(payload);
                }
            })
            .await?;

        let weak = Arc::downgrade(&state);
        monitor
            .listen(Topic::TargetTemperature, move |payload| {
                if let Some(state) = weak.upgrade() {
                    state.on_target_temperature(payload);
                }
            })
            .await?;

        // The initial backfill takes the lower generation, so a retained
        // window delivered to the listener below supersedes it.
        spawn_backfill(&state, config.default_time_window);

        let weak = Arc::downgrade(&state);
        monitor
            .listen(
                Topic::Config(TIME_WINDOW_CONFIG_KEY.to_string()),
                move |payload| on_time_window(&weak, payload),
            )
            .await?;

        info!(
            capacity = config.buffer_capacity,
            window_ms = config.default_time_window.as_millis(),
            "Telemetry monitor started"
        );

        Ok(monitor)
    }

    async fn listen<F>(&self, topic: Topic, handler: F) -> TelemetryResult<()>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let id = self.state.client.on(&topic, handler).await?;
        lock(&self.listeners).push((topic, id));
        Ok(())
    }

    /// Samples held for `signal`, oldest first
    pub fn values(&self, signal: Signal) -> Vec<ValueChange> {
        self.state
            .buffer(signal)
            .map(|buffer| buffer.values())
            .unwrap_or_default()
    }

    pub fn latest(&self, signal: Signal) -> Option<ValueChange> {
        self.state
            .buffer(signal)
            .and_then(|buffer| buffer.last().copied())
    }

    /// Active periods of `signal`, an ongoing one closed at `now`
    pub fn duty_cycle(&self, signal: Signal, now: i64) -> Vec<Interval> {
        match self.state.buffer(signal) {
            Some(buffer) => active_intervals_live(buffer.iter(), now),
            None => Vec::new(),
        }
    }

    pub fn time_window(&self) -> TimeWindow {
        *lock(&self.state.window)
    }

    /// Change the retention window and tell the controller about it
    ///
    /// A backfill for the new window starts immediately; the controller's echo
    /// of the same value is ignored.
    pub async fn set_time_window(&self, window: TimeWindow) -> TelemetryResult<()> {
        if self.state.replace_window(window) {
            info!(window_ms = window.as_millis(), "Time window changed locally");
            spawn_backfill(&self.state, window);
        }

        self.state
            .client
            .set_config(TIME_WINDOW_CONFIG_KEY, window.as_millis().to_string())
            .await
    }

    /// Start another backfill for the current window
    pub fn reload_history(&self) {
        spawn_backfill(&self.state, self.time_window());
    }

    /// Whether a backfill is in flight
    pub fn is_loading(&self) -> bool {
        *self.state.in_flight.borrow() > 0
    }

    /// Wait until no backfill is in flight
    pub async fn history_settled(&self) {
        let mut in_flight = self.state.in_flight.subscribe();
        // The sender lives in `state`, which `self` keeps alive
        let _ = in_flight.wait_for(|count| *count == 0).await;
    }

    pub fn mode(&self) -> Option<Mode> {
        lock(&self.state.controller).mode
    }

    pub fn control_method(&self) -> Option<ControlMethod> {
        lock(&self.state.controller).control_method
    }

    /// Boiler target temperature in °C
    pub fn target_temperature(&self) -> Option<f64> {
        lock(&self.state.controller).target_temperature
    }

    pub fn client(&self) -> &StreamClient {
        &self.state.client
    }

    /// Remove every listener the monitor registered
    pub async fn shutdown(&self) -> TelemetryResult<()> {
        let listeners: Vec<(Topic, ListenerId)> = lock(&self.listeners).drain(..).collect();

        for (topic, id) in &listeners {
            self.state.client.off(topic, *id).await?;
        }

        info!(listeners = listeners.len(), "Telemetry monitor stopped");
        Ok(())
    }
}
