//! Client configuration
//!
//! Everything a [`crate::core::client::RealtimeClient`] needs to run: the
//! realtime endpoint, the HTTP base for the fallback path, the reconnect
//! policy, optional keepalive, and the queue location/tunables.

use crate::queue::sync::SyncSettings;
use crate::traits::reconnect::{ExponentialBackoff, ReconnectionStrategy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the realtime delivery layer
pub struct ClientConfig {
    /// WebSocket endpoint, scheme and host only (`wss://chat.example.com`)
    pub endpoint: String,
    /// HTTP base URL for replaying queued operations
    pub api_base: String,
    /// Backing file for the persistent queue
    pub queue_path: PathBuf,
    /// Reconnect scheduling policy
    pub reconnect: Arc<dyn ReconnectionStrategy>,
    /// Optional keepalive: interval and text payload
    pub heartbeat: Option<(Duration, String)>,
    /// Offline sync tunables
    pub sync: SyncSettings,
}

impl ClientConfig {
    /// Configuration with the default policies
    pub fn new(
        endpoint: impl Into<String>,
        api_base: impl Into<String>,
        queue_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_base: api_base.into(),
            queue_path: queue_path.into(),
            reconnect: Arc::new(ExponentialBackoff::default()),
            heartbeat: None,
            sync: SyncSettings::default(),
        }
    }

    pub fn with_reconnect_strategy(
        mut self,
        strategy: impl ReconnectionStrategy + 'static,
    ) -> Self {
        self.reconnect = Arc::new(strategy);
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, payload: impl Into<String>) -> Self {
        self.heartbeat = Some((interval, payload.into()));
        self
    }

    pub fn with_sync_settings(mut self, sync: SyncSettings) -> Self {
        self.sync = sync;
        self
    }
}
