//! # ChatWire
//!
//! Realtime delivery layer for a messaging client: one live bidirectional
//! connection to the chat backend, typed fan-out of inbound events to
//! subscribers, optimistic outbound sends with a persisted offline queue
//! behind them, and retried replay of that queue when connectivity returns.
//!
//! ## Guarantees
//!
//! - The live socket path is at-most-once: `send` reports local handoff,
//!   never server receipt, and unconfirmed sends are not failures.
//! - The queued fallback path is at-least-once: operations survive process
//!   restarts and are replayed with bounded retries; only retry/age
//!   exhaustion produces a user-visible failure.
//! - Connection state only moves along the documented state machine, and
//!   every transition notifies listeners synchronously in registration
//!   order.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatwire::{ClientConfig, OutboundKind, RealtimeClient};
//!
//! #[tokio::main]
//! async fn main() -> chatwire::Result<()> {
//!     let config = ClientConfig::new(
//!         "wss://chat.example.com",
//!         "https://chat.example.com",
//!         "pending_queue.json",
//!     );
//!     let client = RealtimeClient::new(config)?;
//!
//!     let _messages = client.on_message(|message| {
//!         println!("{}: {}", message.sender_id, message.content);
//!     });
//!
//!     client.connect("u1", "token")?;
//!
//!     // Returns an optimistic record immediately, even while offline.
//!     let envelope = client.submit(
//!         OutboundKind::Message,
//!         serde_json::json!({"conversationId": "c1", "content": "hello"}),
//!     );
//!     println!("submitted {} ({:?})", envelope.id, envelope.status);
//!
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod queue;
pub mod traits;

// Re-export all traits
pub use crate::traits::*;

// Re-export core functionality
pub use crate::core::{
    client::RealtimeClient,
    config::ClientConfig,
    connection::{ConnectionManager, StateSubscription},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics},
    event::{
        ConversationId, DeliveryStatus, GroupPayload, MessagePayload, OutboundEnvelope,
        OutboundKind, ReadPayload, ServerEvent, TypingPayload,
    },
    pipeline::{FailureSubscription, SendPipeline},
    registry::{EventRegistry, EventSubscription, ListenerRegistry, Subscription, Topic},
    router::EventRouter,
};

// Re-export the queue layer
pub use crate::queue::{
    OfflineSyncWorker, PendingQueueItem, PersistentQueueStore, SyncOutcomes, SyncReport,
    SyncSettings,
};

/// Type alias for Result with ChatWireError
pub type Result<T> = std::result::Result<T, traits::ChatWireError>;
