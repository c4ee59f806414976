// Copyright (c) 2025 - Cowboy AI, Inc.

//! Topic hierarchy of the gesha controller
//!
//! Every topic lives under a root namespace (`gesha` by default) and is
//! `/`-delimited:
//!
//! ```text
//! gesha/{path}
//! ```
//!
//! Known topics form a closed enumeration. Parameterized topics (history
//! response ids, shot history response ids, config keys) are matched by
//! pattern into variants carrying their parameter:
//!
//! - `gesha/temperature/boiler` → `Topic::Signal(Signal::BoilerTemperature)`
//! - `gesha/temperature/history/0190…` → `Topic::TemperatureHistory("0190…")`
//! - `gesha/config/ui_time_window` → `Topic::Config("ui_time_window")`
//!
//! # Examples
//!
//! ```rust
//! use gesha_telemetry::topics::{Signal, Topic, TopicNamespace};
//!
//! let namespace = TopicNamespace::default();
//!
//! assert_eq!(
//!     namespace.qualify(&Topic::Signal(Signal::BoilerTemperature)),
//!     "gesha/temperature/boiler"
//! );
//! assert_eq!(
//!     namespace.parse("gesha/config/ui_time_window"),
//!     Some(Topic::Config("ui_time_window".to_string()))
//! );
//! assert_eq!(namespace.parse("elsewhere/mode"), None);
//! ```

use std::fmt;

/// Default root namespace for all controller topics
pub const GESHA_ROOT: &str = "gesha";

/// Config key holding the dashboard's retention window in milliseconds
pub const TIME_WINDOW_CONFIG_KEY: &str = "ui_time_window";

/// Live numeric series published by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    /// Boiler water temperature
    BoilerTemperature,
    /// Grouphead temperature
    GroupheadTemperature,
    /// Thermofilter (portafilter basket) temperature, when a probe is fitted
    ThermofilterTemperature,
    /// Model prediction of the thermofilter temperature
    PredictedThermofilterTemperature,
    /// Heater duty level, 0 when the heater is off
    BoilerLevel,
}

impl Signal {
    pub const ALL: [Signal; 5] = [
        Signal::BoilerTemperature,
        Signal::GroupheadTemperature,
        Signal::ThermofilterTemperature,
        Signal::PredictedThermofilterTemperature,
        Signal::BoilerLevel,
    ];

    /// Topic path relative to the namespace root
    pub fn path(&self) -> &'static str {
        match self {
            Signal::BoilerTemperature => "temperature/boiler",
            Signal::GroupheadTemperature => "temperature/grouphead",
            Signal::ThermofilterTemperature => "temperature/thermofilter",
            Signal::PredictedThermofilterTemperature => "temperature/thermofilter_predicted",
            Signal::BoilerLevel => "boiler_level",
        }
    }

    fn from_path(path: &str) -> Option<Self> {
        Signal::ALL.into_iter().find(|signal| signal.path() == path)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// A controller topic, relative to the namespace root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Live numeric series
    Signal(Signal),
    /// Boiler target temperature
    TargetTemperature,
    /// Timestamp of the last temperature sample
    LastUpdated,
    /// Operating mode
    Mode,
    /// Active control method
    ControlMethod,
    /// Current value of a configuration key
    Config(String),
    /// Response to the history request with this id
    TemperatureHistory(String),
    /// Response to the shot history request with this id
    ShotHistory(String),

    // Commands
    /// Request measurement history
    TemperatureHistoryCommand,
    /// Request shot history
    ShotHistoryCommand,
    ModeSet,
    ControlMethodSet,
    TargetTemperatureSet,
    BoilerLevelSet,
    ConfigSet,
}

impl Topic {
    /// Topic path relative to the namespace root
    pub fn path(&self) -> String {
        match self {
            Topic::Signal(signal) => signal.path().to_string(),
            Topic::TargetTemperature => "temperature/target".to_string(),
            Topic::LastUpdated => "temperature/last_updated".to_string(),
            Topic::Mode => "mode".to_string(),
            Topic::ControlMethod => "control_method".to_string(),
            Topic::Config(key) => format!("config/{key}"),
            Topic::TemperatureHistory(id) => format!("temperature/history/{id}"),
            Topic::ShotHistory(id) => format!("shot/history/{id}"),
            Topic::TemperatureHistoryCommand => "temperature/history/command".to_string(),
            Topic::ShotHistoryCommand => "shot/history/command".to_string(),
            Topic::ModeSet => "mode/set".to_string(),
            Topic::ControlMethodSet => "control_method/set".to_string(),
            Topic::TargetTemperatureSet => "temperature/target/set".to_string(),
            Topic::BoilerLevelSet => "boiler_level/set".to_string(),
            Topic::ConfigSet => "config/set".to_string(),
        }
    }

    /// Parse a path relative to the namespace root
    pub fn from_path(path: &str) -> Option<Self> {
        if let Some(signal) = Signal::from_path(path) {
            return Some(Topic::Signal(signal));
        }

        let topic = match path {
            "temperature/target" => Topic::TargetTemperature,
            "temperature/last_updated" => Topic::LastUpdated,
            "mode" => Topic::Mode,
            "control_method" => Topic::ControlMethod,
            "temperature/history/command" => Topic::TemperatureHistoryCommand,
            "shot/history/command" => Topic::ShotHistoryCommand,
            "mode/set" => Topic::ModeSet,
            "control_method/set" => Topic::ControlMethodSet,
            "temperature/target/set" => Topic::TargetTemperatureSet,
            "boiler_level/set" => Topic::BoilerLevelSet,
            "config/set" => Topic::ConfigSet,
            _ => return Self::from_parameterized(path),
        };

        Some(topic)
    }

    fn from_parameterized(path: &str) -> Option<Self> {
        fn parameter<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
            path.strip_prefix(prefix)
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
        }

        if let Some(id) = parameter(path, "temperature/history/") {
            Some(Topic::TemperatureHistory(id.to_string()))
        } else if let Some(id) = parameter(path, "shot/history/") {
            Some(Topic::ShotHistory(id.to_string()))
        } else {
            parameter(path, "config/").map(|key| Topic::Config(key.to_string()))
        }
    }

    /// Whether this is a command topic published by the client
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Topic::TemperatureHistoryCommand
                | Topic::ShotHistoryCommand
                | Topic::ModeSet
                | Topic::ControlMethodSet
                | Topic::TargetTemperatureSet
                | Topic::BoilerLevelSet
                | Topic::ConfigSet
        )
    }
}

impl From<Signal> for Topic {
    fn from(signal: Signal) -> Self {
        Topic::Signal(signal)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Maps topics to and from fully qualified transport topic strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamespace {
    root: String,
}

impl TopicNamespace {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Fully qualified topic string, e.g. `gesha/mode`
    pub fn qualify(&self, topic: &Topic) -> String {
        if self.root.is_empty() {
            topic.path()
        } else {
            format!("{}/{}", self.root, topic.path())
        }
    }

    /// Parse a fully qualified topic string
    ///
    /// Returns `None` for topics outside the namespace or of unknown shape.
    pub fn parse(&self, qualified: &str) -> Option<Topic> {
        let path = if self.root.is_empty() {
            qualified
        } else {
            qualified.strip_prefix(&self.root)?.strip_prefix('/')?
        };

        Topic::from_path(path)
    }
}

impl Default for TopicNamespace {
    fn default() -> Self {
        Self::new(GESHA_ROOT)
    }
}
