//! Core of the realtime delivery layer
//!
//! The connection manager owns the socket and the state machine; the router
//! fans inbound events out to subscribers; the pipeline tracks outbound
//! envelopes through their delivery lifecycle. The caller-facing
//! composition of all of it is [`client::RealtimeClient`].

pub mod client;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod event;
pub mod heartbeat;
pub mod pipeline;
pub mod registry;
pub mod router;

// Re-export main types
pub use client::RealtimeClient;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, StateSubscription};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use event::{
    ConversationId, DeliveryStatus, GroupPayload, MessagePayload, OutboundEnvelope, OutboundKind,
    ReadPayload, ServerEvent, TypingPayload,
};
pub use pipeline::{FailureSubscription, SendPipeline};
pub use registry::{EventRegistry, EventSubscription, ListenerRegistry, Subscription, Topic};
pub use router::EventRouter;
