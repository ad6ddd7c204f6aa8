//! # ChatWire Traits
//!
//! Pluggable seams for the chatwire realtime delivery layer:
//!
//! - **ReconnectionStrategy**: backoff policy for reconnect scheduling
//! - **SyncTransport**: replay of queued operations over HTTP
//!
//! Plus the crate-wide error type.

pub mod error;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{ChatWireError, Result};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{HttpSyncTransport, SyncTransport};
