// Copyright (c) 2025 - Cowboy AI, Inc.
//! Measurement domain types
//!
//! Wire shapes published by the controller and the queries sent back to it.
//! All timestamps are epoch milliseconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{TelemetryError, TelemetryResult};
use crate::payload::Payload;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One observed change of a named signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub value: f64,
}

impl ValueChange {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Interpret a live update
    ///
    /// Accepts a JSON `{"timestamp": .., "value": ..}` object, or a bare number
    /// which is stamped with `received_at`. Anything else is a shape error.
    pub fn from_payload(payload: &Payload, received_at: i64) -> TelemetryResult<Self> {
        match payload {
            Payload::Json(serde_json::Value::Number(number)) => number
                .as_f64()
                .map(|value| Self::new(received_at, value))
                .ok_or_else(|| {
                    TelemetryError::ShapeValidation(format!("value is not finite: {number}"))
                }),
            Payload::Json(serde_json::Value::Object(object)) => {
                let timestamp = object.get("timestamp").and_then(|t| {
                    t.as_i64().or_else(|| t.as_f64().map(|t| t as i64))
                });
                let value = object.get("value").and_then(serde_json::Value::as_f64);

                match (timestamp, value) {
                    (Some(timestamp), Some(value)) => Ok(Self::new(timestamp, value)),
                    _ => Err(TelemetryError::ShapeValidation(format!(
                        "value is not a ValueChange: {payload}"
                    ))),
                }
            }
            other => Err(TelemetryError::ShapeValidation(format!(
                "value is not a ValueChange: {other}"
            ))),
        }
    }

    pub fn is_active(&self) -> bool {
        self.value > 0.0
    }
}

/// One row of the controller's measurement history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub time: i64,
    pub target_temp_c: f64,
    pub boiler_temp_c: f64,
    pub grouphead_temp_c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermofilter_temp_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_level: Option<f64>,
    pub power: bool,
    pub pull: bool,
    pub steam: bool,
}

/// Summary of one pulled shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shot {
    pub start_time: i64,
    pub end_time: i64,
    pub total_time: i64,
    pub brew_temp_average_c: f64,
    pub grouphead_temp_avg_c: f64,
}

/// Operating mode of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Offline,
    Idle,
    Active,
    Brew,
    Steam,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Offline => "offline",
            Mode::Idle => "idle",
            Mode::Active => "active",
            Mode::Brew => "brew",
            Mode::Steam => "steam",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(Mode::Offline),
            "idle" => Ok(Mode::Idle),
            "active" => Ok(Mode::Active),
            "brew" => Ok(Mode::Brew),
            "steam" => Ok(Mode::Steam),
            other => Err(TelemetryError::ShapeValidation(format!(
                "unknown mode: {other}"
            ))),
        }
    }
}

/// Boiler control strategy running on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMethod {
    None,
    Threshold,
    #[serde(rename = "PID")]
    Pid,
    #[serde(rename = "MPC")]
    Mpc,
}

impl ControlMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMethod::None => "None",
            ControlMethod::Threshold => "Threshold",
            ControlMethod::Pid => "PID",
            ControlMethod::Mpc => "MPC",
        }
    }
}

impl fmt::Display for ControlMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMethod {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(ControlMethod::None),
            "Threshold" => Ok(ControlMethod::Threshold),
            "PID" => Ok(ControlMethod::Pid),
            "MPC" => Ok(ControlMethod::Mpc),
            other => Err(TelemetryError::ShapeValidation(format!(
                "unknown control method: {other}"
            ))),
        }
    }
}

/// Retention window shown by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeWindow {
    OneMinute,
    FiveMinutes,
    #[default]
    TenMinutes,
    ThirtyMinutes,
    OneHour,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 5] = [
        TimeWindow::OneMinute,
        TimeWindow::FiveMinutes,
        TimeWindow::TenMinutes,
        TimeWindow::ThirtyMinutes,
        TimeWindow::OneHour,
    ];

    pub fn as_millis(&self) -> i64 {
        match self {
            TimeWindow::OneMinute => 60_000,
            TimeWindow::FiveMinutes => 5 * 60_000,
            TimeWindow::TenMinutes => 10 * 60_000,
            TimeWindow::ThirtyMinutes => 30 * 60_000,
            TimeWindow::OneHour => 60 * 60_000,
        }
    }
}

impl TryFrom<i64> for TimeWindow {
    type Error = TelemetryError;

    fn try_from(millis: i64) -> Result<Self, Self::Error> {
        TimeWindow::ALL
            .into_iter()
            .find(|window| window.as_millis() == millis)
            .ok_or_else(|| {
                TelemetryError::Configuration(format!("{millis} is not a TimeWindow value"))
            })
    }
}

impl TryFrom<&Payload> for TimeWindow {
    type Error = TelemetryError;

    /// Config values arrive either as JSON numbers or as numeric strings
    fn try_from(payload: &Payload) -> Result<Self, Self::Error> {
        let millis = match payload {
            Payload::Json(serde_json::Value::Number(n)) => n.as_i64(),
            Payload::Json(serde_json::Value::String(s)) | Payload::Text(s) => s.trim().parse().ok(),
            _ => None,
        };

        millis
            .ok_or_else(|| TelemetryError::Configuration(format!("{payload} is not a TimeWindow value")))
            .and_then(TimeWindow::try_from)
    }
}

/// Default deadline for correlated history requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Parameters of a history request
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub from: i64,
    pub to: i64,
    pub limit: Option<u32>,
    pub bucket_size: Option<i64>,
    pub timeout: Duration,
}

impl HistoryQuery {
    /// Query the range `from..to` (epoch milliseconds)
    pub fn new(from: i64, to: i64) -> Self {
        Self {
            from,
            to,
            limit: None,
            bucket_size: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Query the `window` ending at `now`
    pub fn trailing(window: TimeWindow, now: i64) -> Self {
        Self::new(now - window.as_millis(), now)
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Ask the controller to aggregate rows into buckets of this many milliseconds
    pub fn bucket_size(mut self, bucket_size: i64) -> Self {
        self.bucket_size = Some(bucket_size);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Wire form of a history command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryCommand {
    pub id: String,
    pub from: i64,
    pub to: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_size: Option<i64>,
}

impl HistoryCommand {
    pub fn new(id: impl Into<String>, query: &HistoryQuery) -> Self {
        Self {
            id: id.into(),
            from: query.from,
            to: query.to,
            limit: query.limit,
            bucket_size: query.bucket_size,
        }
    }
}

/// Wire form of a configuration change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCommand {
    pub key: String,
    pub value: String,
}
