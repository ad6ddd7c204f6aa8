//! Durable store for pending outbound operations
//!
//! One JSON array document on disk, ordered by creation time, surviving
//! process restarts. Eviction is deliberate: items past the retention
//! window are dropped on every load and reported as delivery failures, not
//! resurrected. All access is serialized behind a mutex; the submit path
//! and the sync worker share this store.

use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// A persisted outbound operation, replayed over HTTP when connectivity
/// returns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingQueueItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: String,
    pub data: Value,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
}

struct StoreInner {
    path: PathBuf,
    items: Vec<PendingQueueItem>,
}

/// Durable FIFO-ish queue ordered by creation time
pub struct PersistentQueueStore {
    retention: ChronoDuration,
    inner: Mutex<StoreInner>,
}

impl PersistentQueueStore {
    /// Open (or create) the store at `path`
    ///
    /// Pruning runs as part of every load; anything evicted here is logged
    /// as a delivery failure and returned so the caller can surface it.
    pub fn open(path: impl AsRef<Path>, retention: Duration) -> Result<Self> {
        let store = Self {
            retention: ChronoDuration::from_std(retention)
                .unwrap_or_else(|_| ChronoDuration::days(7)),
            inner: Mutex::new(StoreInner {
                path: path.as_ref().to_path_buf(),
                items: load_items(path.as_ref())?,
            }),
        };
        let evicted = store.prune()?;
        if !evicted.is_empty() {
            warn!("dropped {} expired queue item(s) on load", evicted.len());
        }
        Ok(store)
    }

    /// Append an item and persist
    pub fn enqueue(&self, item: PendingQueueItem) -> Result<String> {
        let id = item.id.clone();
        let mut inner = self.inner.lock();
        inner.items.push(item);
        inner.items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        persist(&inner)?;
        debug!("enqueued pending operation {id}");
        Ok(id)
    }

    /// Remove an item by id and persist
    pub fn dequeue(&self, id: &str) -> Result<Option<PendingQueueItem>> {
        let mut inner = self.inner.lock();
        let position = inner.items.iter().position(|item| item.id == id);
        let removed = position.map(|index| inner.items.remove(index));
        if removed.is_some() {
            persist(&inner)?;
        }
        Ok(removed)
    }

    /// Snapshot of all items, sorted by creation time ascending
    pub fn list(&self) -> Vec<PendingQueueItem> {
        let inner = self.inner.lock();
        let mut items = inner.items.clone();
        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        items
    }

    /// Stamp one sync attempt on an item and persist
    ///
    /// Returns the new attempt count, or None for an unknown id.
    pub fn record_attempt(&self, id: &str) -> Result<Option<u32>> {
        let mut inner = self.inner.lock();
        let Some(item) = inner.items.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        item.retry_count += 1;
        item.last_attempt = Some(Utc::now());
        let count = item.retry_count;
        persist(&inner)?;
        Ok(Some(count))
    }

    /// Evict everything older than the retention window, unconditionally
    ///
    /// Returns the evicted items. Each eviction is a delivery failure and
    /// is logged as one; age wins over any remaining retry budget.
    pub fn prune(&self) -> Result<Vec<PendingQueueItem>> {
        let cutoff = Utc::now() - self.retention;
        let mut inner = self.inner.lock();

        let (expired, kept): (Vec<_>, Vec<_>) = inner
            .items
            .drain(..)
            .partition(|item| item.timestamp < cutoff);
        inner.items = kept;

        if !expired.is_empty() {
            for item in &expired {
                warn!(
                    "delivery failed: queue item {} ({} {}) exceeded retention, created {}",
                    item.id, item.method, item.endpoint, item.timestamp
                );
            }
            persist(&inner)?;
        }
        Ok(expired)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

/// Read the backing document; a missing file is an empty queue
fn load_items(path: &Path) -> Result<Vec<PendingQueueItem>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

/// Rewrite the backing document with fsync for durability
fn persist(inner: &StoreInner) -> Result<()> {
    let json = serde_json::to_string(&inner.items)?;
    let mut file = File::create(&inner.path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
