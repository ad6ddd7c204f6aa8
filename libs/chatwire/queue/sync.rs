//! Offline queue drain
//!
//! The worker replays persisted operations through a [`SyncTransport`] when
//! connectivity returns. Per-item failures are retried within the pass,
//! tallied, and never escape the worker's boundary; an item only leaves the
//! queue on success or on hitting the attempt cap, and the cap eviction is
//! reported as a terminal delivery failure.

use crate::queue::store::{PendingQueueItem, PersistentQueueStore};
use crate::traits::transport::SyncTransport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for the fallback path
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Immediate retries per item within one pass
    pub retry_count: u32,
    /// Pause between immediate retries
    pub retry_delay: Duration,
    /// Total attempts before an item is evicted as failed
    pub max_attempts: u32,
    /// Age past which items are evicted unconditionally
    pub retention: Duration,
    /// Optional timer-driven drain in addition to the reconnect trigger
    pub interval: Option<Duration>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry_count: 2,
            retry_delay: Duration::from_secs(1),
            max_attempts: 5,
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            interval: None,
        }
    }
}

/// Outcome tallies for one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub success_count: usize,
    pub failed_count: usize,
    pub remaining_count: usize,
}

/// Observer for per-item drain outcomes
///
/// The send pipeline implements this to resolve optimistic records; tests
/// implement it to assert on terminal failures.
pub trait SyncOutcomes: Send + Sync {
    /// The backend accepted the item
    fn delivered(&self, item: &PendingQueueItem);
    /// The item was evicted (attempt cap or retention). Terminal.
    fn failed(&self, item: &PendingQueueItem);
}

/// Drains the persistent queue through a transport
pub struct OfflineSyncWorker {
    store: Arc<PersistentQueueStore>,
    transport: Arc<dyn SyncTransport>,
    settings: SyncSettings,
    outcomes: Option<Arc<dyn SyncOutcomes>>,
}

impl OfflineSyncWorker {
    pub fn new(
        store: Arc<PersistentQueueStore>,
        transport: Arc<dyn SyncTransport>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            transport,
            settings,
            outcomes: None,
        }
    }

    /// Attach an outcome observer
    pub fn with_outcomes(mut self, outcomes: Arc<dyn SyncOutcomes>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    /// Run one drain pass over the queue
    ///
    /// Never returns an error; everything that can go wrong per item is
    /// caught, logged, and reflected in the report.
    pub async fn sync(&self) -> SyncReport {
        let mut report = SyncReport::default();

        // Age eviction first, so nothing stale consumes attempts.
        match self.store.prune() {
            Ok(expired) => {
                for item in &expired {
                    self.notify_failed(item);
                    report.failed_count += 1;
                }
            }
            Err(e) => warn!("queue prune failed: {e}"),
        }

        let items = self.store.list();
        if items.is_empty() {
            return report;
        }
        info!("draining {} pending operation(s)", items.len());

        for item in items {
            let attempts = match self.store.record_attempt(&item.id) {
                Ok(Some(count)) => count,
                Ok(None) => continue,
                Err(e) => {
                    warn!("failed to stamp attempt on {}: {e}", item.id);
                    continue;
                }
            };

            if self.attempt_with_retries(&item).await {
                if let Err(e) = self.store.dequeue(&item.id) {
                    warn!("failed to remove delivered item {}: {e}", item.id);
                }
                self.notify_delivered(&item);
                report.success_count += 1;
            } else if attempts >= self.settings.max_attempts {
                // Out of budget: the item leaves the queue no matter what.
                warn!(
                    "delivery failed: item {} evicted after {} attempt(s)",
                    item.id, attempts
                );
                if let Err(e) = self.store.dequeue(&item.id) {
                    warn!("failed to evict item {}: {e}", item.id);
                }
                self.notify_failed(&item);
                report.failed_count += 1;
            } else {
                debug!(
                    "item {} stays queued ({}/{} attempts used)",
                    item.id, attempts, self.settings.max_attempts
                );
            }
        }

        report.remaining_count = self.store.len();
        info!(
            "sync pass done: {} delivered, {} failed, {} remaining",
            report.success_count, report.failed_count, report.remaining_count
        );
        report
    }

    /// One queue attempt: the initial try plus the configured immediate
    /// retries, each bounded by the request timeout
    async fn attempt_with_retries(&self, item: &PendingQueueItem) -> bool {
        for round in 0..=self.settings.retry_count {
            let outcome =
                tokio::time::timeout(self.settings.request_timeout, self.transport.execute(item))
                    .await;

            match outcome {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => {
                    warn!("replay of {} failed (round {}): {e}", item.id, round + 1);
                }
                Err(_) => {
                    warn!("replay of {} timed out (round {})", item.id, round + 1);
                }
            }

            if round < self.settings.retry_count {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }
        false
    }

    fn notify_delivered(&self, item: &PendingQueueItem) {
        if let Some(outcomes) = &self.outcomes {
            outcomes.delivered(item);
        }
    }

    fn notify_failed(&self, item: &PendingQueueItem) {
        if let Some(outcomes) = &self.outcomes {
            outcomes.failed(item);
        }
    }
}
