// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for gesha-telemetry
//!
//! Provides a stream client wired to the in-process broker and deterministic
//! measurement rows. All timestamps are fixed constants so tests are
//! reproducible.
#![allow(dead_code)]

use bytes::Bytes;
use std::sync::Arc;

use gesha_telemetry::config::{TelemetryConfig, TransportKind};
use gesha_telemetry::measurement::{HistoryCommand, Measurement};
use gesha_telemetry::topics::TopicNamespace;
use gesha_telemetry::transport::MemoryTransport;
use gesha_telemetry::StreamClient;

pub const HISTORY_COMMAND: &str = "gesha/temperature/history/command";
pub const SHOT_HISTORY_COMMAND: &str = "gesha/shot/history/command";

// Fixed base timestamp (2026-01-19T12:00:00Z)
pub const T0: i64 = 1_768_824_000_000;

/// Stream client over a fresh loopback broker
pub fn memory_client() -> (StreamClient, MemoryTransport) {
    let (transport, events) = MemoryTransport::new(256);
    let client = StreamClient::new(
        Arc::new(transport.clone()),
        events,
        TopicNamespace::default(),
    );
    (client, transport)
}

pub fn memory_config(capacity: usize) -> TelemetryConfig {
    TelemetryConfig {
        transport: TransportKind::Memory,
        buffer_capacity: capacity,
        ..TelemetryConfig::default()
    }
}

/// One measurement row with every temperature set to `boiler`
pub fn measurement(time: i64, boiler: f64, heat_level: f64) -> Measurement {
    Measurement {
        time,
        target_temp_c: 94.0,
        boiler_temp_c: boiler,
        grouphead_temp_c: boiler - 10.0,
        thermofilter_temp_c: None,
        heat_level: Some(heat_level),
        power: true,
        pull: false,
        steam: false,
    }
}

/// Answer every history command with `rows`, the way the controller does
pub fn answer_history(transport: &MemoryTransport, rows: Vec<Measurement>) {
    transport.respond_with(move |topic, payload| {
        if topic != HISTORY_COMMAND {
            return Vec::new();
        }

        let command: HistoryCommand =
            serde_json::from_slice(payload).expect("history command is JSON");
        let reply = serde_json::to_vec(&rows).expect("rows serialize");

        vec![(
            format!("gesha/temperature/history/{}", command.id),
            Bytes::from(reply),
        )]
    });
}

/// History commands published so far
pub fn history_commands(transport: &MemoryTransport) -> Vec<HistoryCommand> {
    transport
        .published(HISTORY_COMMAND)
        .iter()
        .map(|payload| serde_json::from_slice(payload).expect("history command is JSON"))
        .collect()
}

/// Wait until at least `count` history commands have been published
pub async fn wait_for_commands(transport: &MemoryTransport, count: usize) -> Vec<HistoryCommand> {
    for _ in 0..1_000 {
        let commands = history_commands(transport);
        if commands.len() >= count {
            return commands;
        }
        tokio::task::yield_now().await;
    }

    panic!("expected {count} history commands");
}

/// Deliver `rows` as the response to `command`
pub fn reply_history(transport: &MemoryTransport, command: &HistoryCommand, rows: &[Measurement]) {
    let reply = serde_json::to_vec(rows).expect("rows serialize");
    let delivered = transport.inject(
        &format!("gesha/temperature/history/{}", command.id),
        reply,
    );
    assert!(delivered, "no listener for history response {}", command.id);
}

/// Let the dispatcher drain queued events
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
