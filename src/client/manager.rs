// Copyright (c) 2025 - Cowboy AI, Inc.
//! Process-wide connection ownership
//!
//! The controller expects one session per dashboard. The manager connects on
//! first use and hands out clones of that one client afterwards; concurrent
//! first callers wait on the same connection attempt.

use tokio::sync::OnceCell;
use tracing::debug;

use super::StreamClient;
use crate::config::TelemetryConfig;
use crate::errors::TelemetryResult;

/// Lazily created, shared [`StreamClient`]
pub struct ConnectionManager {
    config: TelemetryConfig,
    client: OnceCell<StreamClient>,
}

impl ConnectionManager {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    /// Manager around a client that is already connected
    pub fn with_client(config: TelemetryConfig, client: StreamClient) -> Self {
        Self {
            config,
            client: OnceCell::new_with(Some(client)),
        }
    }

    /// The shared client, connecting first if needed
    ///
    /// A failed attempt leaves the manager empty so the next call retries.
    pub async fn client(&self) -> TelemetryResult<StreamClient> {
        let client = self
            .client
            .get_or_try_init(|| async {
                debug!(transport = %self.config.transport, "Opening shared connection");
                StreamClient::connect(&self.config).await
            })
            .await?;

        Ok(client.clone())
    }

    /// The shared client if it has been created
    pub fn get(&self) -> Option<StreamClient> {
        self.client.get().cloned()
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;

    fn memory_config() -> TelemetryConfig {
        TelemetryConfig {
            transport: TransportKind::Memory,
            ..TelemetryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_client_is_created_once() {
        let manager = ConnectionManager::new(memory_config());
        assert!(manager.get().is_none());

        let first = manager.client().await.unwrap();
        let second = manager.client().await.unwrap();

        assert!(first.same_connection(&second));
        assert!(manager.get().is_some_and(|client| client.same_connection(&first)));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_shares_connection() {
        let manager = ConnectionManager::new(memory_config());

        let (a, b) = tokio::join!(manager.client(), manager.client());

        assert!(a.unwrap().same_connection(&b.unwrap()));
    }
}
