//! Persistence for the degraded delivery path
//!
//! When there is no live socket, outbound operations land in the
//! [`store::PersistentQueueStore`] and are replayed by the
//! [`sync::OfflineSyncWorker`] once connectivity returns.

pub mod store;
pub mod sync;

pub use store::{PendingQueueItem, PersistentQueueStore};
pub use sync::{OfflineSyncWorker, SyncOutcomes, SyncReport, SyncSettings};
