use crate::error::{ChatWireError, Result};
use crate::queue::store::PendingQueueItem;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::debug;

/// Trait for replaying queued operations against the backend
///
/// The offline sync worker is transport-agnostic: it drains the persistent
/// queue and hands each item to a `SyncTransport`. The production
/// implementation is [`HttpSyncTransport`]; tests substitute their own.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Perform the operation described by a queued item
    ///
    /// # Returns
    /// * `Ok(())` - The backend accepted the operation
    /// * `Err(ChatWireError)` - The attempt failed and may be retried
    async fn execute(&self, item: &PendingQueueItem) -> Result<()>;
}

/// HTTP implementation of [`SyncTransport`]
///
/// Replays items as JSON-body requests against a base URL. Bodies are sent
/// with `Content-Type: application/json`.
pub struct HttpSyncTransport {
    base_url: String,
    client: Client,
}

impl HttpSyncTransport {
    /// Create a new HTTP transport with the given request timeout
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn execute(&self, item: &PendingQueueItem) -> Result<()> {
        let method = Method::from_bytes(item.method.as_bytes())
            .map_err(|_| ChatWireError::Configuration(format!("bad method: {}", item.method)))?;
        let url = format!("{}{}", self.base_url, item.endpoint);

        debug!("{} {} (queued item {})", item.method, url, item.id);

        let response = self
            .client
            .request(method, &url)
            .json(&item.data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatWireError::SyncRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
