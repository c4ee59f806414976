// Copyright (c) 2025 - Cowboy AI, Inc.
//! Headless gesha monitor
//!
//! Connects to the controller's broker, keeps the live telemetry view up to
//! date and logs a summary at a fixed interval until interrupted.
//!
//! Run with: cargo run --bin gesha-monitor
//!
//! Configuration comes from `GESHA_*` environment variables, e.g.
//! `GESHA_TRANSPORT=mqtt GESHA_MQTT_HOST=espresso.local`.

use anyhow::{Context, Result};
use gesha_telemetry::{
    measurement::now_millis, ConnectionManager, Signal, TelemetryConfig, TelemetryMonitor,
};
use std::time::Duration;
use tracing::{info, warn};

const SUMMARY_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = TelemetryConfig::from_env().context("Invalid GESHA_* configuration")?;
    info!(
        transport = %config.transport,
        servers = ?config.servers,
        root = %config.topic_root,
        "Starting gesha monitor"
    );

    let manager = ConnectionManager::new(config.clone());
    let client = manager
        .client()
        .await
        .context("Failed to connect to the broker")?;

    let monitor = TelemetryMonitor::start(client.clone(), &config)
        .await
        .context("Failed to register telemetry listeners")?;

    let mut status = client.status();
    let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    warn!("Connection closed");
                    break;
                }
                let current = *status.borrow_and_update();
                info!(status = %current, "Connection status changed");
            }
            _ = ticker.tick() => log_summary(&monitor),
        }
    }

    monitor
        .shutdown()
        .await
        .context("Failed to release subscriptions")?;

    Ok(())
}

fn log_summary(monitor: &TelemetryMonitor) {
    let now = now_millis();

    for signal in Signal::ALL {
        match monitor.latest(signal) {
            Some(latest) => info!(
                signal = %signal,
                value = latest.value,
                age_ms = now - latest.timestamp,
                samples = monitor.values(signal).len(),
                "Latest sample"
            ),
            None => info!(signal = %signal, "No samples yet"),
        }
    }

    let heating_ms: i64 = monitor
        .duty_cycle(Signal::BoilerLevel, now)
        .iter()
        .map(|interval| interval.duration_ms())
        .sum();

    info!(
        mode = ?monitor.mode(),
        control_method = ?monitor.control_method(),
        target_c = ?monitor.target_temperature(),
        window_ms = monitor.time_window().as_millis(),
        heating_ms,
        loading = monitor.is_loading(),
        "Controller state"
    );
}
