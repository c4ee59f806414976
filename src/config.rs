// Copyright (c) 2025 - Cowboy AI, Inc.
//! Client configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{TelemetryError, TelemetryResult};
use crate::measurement::{TimeWindow, DEFAULT_REQUEST_TIMEOUT};
use crate::topics::GESHA_ROOT;

/// Which broker protocol to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// NATS core messaging
    #[default]
    Nats,
    /// MQTT 3.1.1, the controller's native broker protocol
    Mqtt,
    /// In-process loopback broker
    Memory,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Nats => write!(f, "nats"),
            TransportKind::Mqtt => write!(f, "mqtt"),
            TransportKind::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nats" => Ok(TransportKind::Nats),
            "mqtt" => Ok(TransportKind::Mqtt),
            "memory" => Ok(TransportKind::Memory),
            other => Err(TelemetryError::Configuration(format!(
                "unknown transport: {other}"
            ))),
        }
    }
}

/// Configuration for the telemetry client
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Broker protocol
    pub transport: TransportKind,
    /// Broker URLs
    pub servers: Vec<String>,
    /// Client name (MQTT client id)
    pub client_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Root namespace of the controller's topics
    pub topic_root: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Default deadline for history requests
    pub request_timeout: Duration,
    /// Samples kept per signal
    pub buffer_capacity: usize,
    /// Aggregation bucket requested for backfills
    pub history_bucket_size: Duration,
    /// Retention window used until the controller reports one
    pub default_time_window: TimeWindow,
    /// Capacity of the inbound transport event queue
    pub inbound_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Nats,
            servers: vec!["nats://localhost:4222".to_string()],
            client_name: "gesha-telemetry".to_string(),
            username: None,
            password: None,
            topic_root: GESHA_ROOT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            buffer_capacity: 4096,
            history_bucket_size: Duration::from_secs(2),
            default_time_window: TimeWindow::default(),
            inbound_capacity: 1024,
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from `GESHA_*` environment variables
    pub fn from_env() -> TelemetryResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Unset keys keep their defaults. Set but invalid values are errors.
    pub fn from_lookup<F>(lookup: F) -> TelemetryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(transport) = lookup("GESHA_TRANSPORT") {
            config.transport = transport.parse()?;
            if config.transport == TransportKind::Mqtt {
                config.servers = vec!["mqtt://localhost:1883".to_string()];
            }
        }

        if let Some(servers) = lookup("GESHA_SERVERS") {
            config.servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        } else if let Some(host) = lookup("GESHA_MQTT_HOST") {
            let port = lookup("GESHA_MQTT_PORT").unwrap_or_else(|| "1883".to_string());
            config.servers = vec![format!("mqtt://{host}:{port}")];
        }

        if config.servers.is_empty() {
            return Err(TelemetryError::Configuration(
                "at least one server is required".to_string(),
            ));
        }

        config.username = lookup("GESHA_MQTT_USER").or(config.username);
        config.password = lookup("GESHA_MQTT_PASS").or(config.password);

        if let Some(name) = lookup("GESHA_CLIENT_NAME") {
            config.client_name = name;
        }

        if let Some(root) = lookup("GESHA_TOPIC_ROOT") {
            config.topic_root = root;
        }

        if let Some(capacity) = lookup("GESHA_BUFFER_CAPACITY") {
            config.buffer_capacity = parse_number("GESHA_BUFFER_CAPACITY", &capacity)?;
        }

        if let Some(timeout) = lookup("GESHA_REQUEST_TIMEOUT_MS") {
            config.request_timeout =
                Duration::from_millis(parse_number("GESHA_REQUEST_TIMEOUT_MS", &timeout)?);
        }

        if let Some(window) = lookup("GESHA_TIME_WINDOW_MS") {
            config.default_time_window =
                TimeWindow::try_from(parse_number::<i64>("GESHA_TIME_WINDOW_MS", &window)?)?;
        }

        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> TelemetryResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TelemetryError::Configuration(format!("{key} is not a number: {value}")))
}
