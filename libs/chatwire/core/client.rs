//! Caller-facing realtime client
//!
//! Composes the connection manager, event routing, send pipeline, and
//! offline sync into one caller-owned instance with an explicit lifecycle:
//! construct, `connect`, `disconnect`, `shutdown`. Nothing here is a
//! process-wide singleton; tests run several independent instances side by
//! side.

use crate::core::config::ClientConfig;
use crate::core::connection::{ConnectionManager, StateSubscription};
use crate::core::connection_state::{ConnectionState, Metrics};
use crate::core::event::{
    DeliveryStatus, MessagePayload, OutboundEnvelope, OutboundKind, ReadPayload, ServerEvent,
    TypingPayload,
};
use crate::core::pipeline::{FailureSubscription, SendPipeline};
use crate::core::registry::{EventRegistry, EventSubscription, Topic};
use crate::core::router::EventRouter;
use crate::error::Result;
use crate::queue::store::PersistentQueueStore;
use crate::queue::sync::{OfflineSyncWorker, SyncOutcomes, SyncReport};
use crate::traits::transport::HttpSyncTransport;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Realtime delivery client
///
/// One instance owns one logical connection plus the persisted fallback
/// queue behind it. Must be constructed within a tokio runtime.
pub struct RealtimeClient {
    registry: Arc<EventRegistry>,
    connection: Arc<ConnectionManager>,
    pipeline: Arc<SendPipeline>,
    worker: Arc<OfflineSyncWorker>,
    sync_task: tokio::task::JoinHandle<()>,
    // Held for the lifetime of the client; dropped (not unsubscribed) only
    // at shutdown, when the whole registry goes away with them.
    _ack_subscription: EventSubscription,
    _drain_subscription: StateSubscription,
}

impl RealtimeClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let registry = Arc::new(EventRegistry::new());
        let router = Arc::new(EventRouter::new(Arc::clone(&registry)));
        let connection = Arc::new(ConnectionManager::new(
            config.endpoint.clone(),
            Arc::clone(&config.reconnect),
            config.heartbeat.clone(),
            Arc::clone(&router),
        ));

        let store = Arc::new(PersistentQueueStore::open(
            &config.queue_path,
            config.sync.retention,
        )?);
        let pipeline = Arc::new(SendPipeline::new(
            Arc::clone(&connection),
            Arc::clone(&store),
        ));

        let transport = Arc::new(HttpSyncTransport::new(
            config.api_base.clone(),
            config.sync.request_timeout,
        ));
        let worker = Arc::new(
            OfflineSyncWorker::new(Arc::clone(&store), transport, config.sync.clone())
                .with_outcomes(Arc::clone(&pipeline) as Arc<dyn SyncOutcomes>),
        );

        // Server confirmations reconcile optimistic records.
        let ack_subscription = {
            let pipeline = Arc::clone(&pipeline);
            registry.subscribe(Topic::Messages, move |event| {
                pipeline.observe_inbound(event);
            })
        };

        // Connectivity restored is the drain trigger; an optional timer
        // also drains in the background.
        let drain_notify = Arc::new(Notify::new());
        let drain_subscription = {
            let notify = Arc::clone(&drain_notify);
            connection.on_state_change(move |state| {
                if state == ConnectionState::Connected {
                    notify.notify_one();
                }
            })
        };
        let sync_task = tokio::spawn(run_sync_loop(
            Arc::clone(&worker),
            drain_notify,
            config.sync.interval,
        ));

        Ok(Self {
            registry,
            connection,
            pipeline,
            worker,
            sync_task,
            _ack_subscription: ack_subscription,
            _drain_subscription: drain_subscription,
        })
    }

    /// Open the realtime connection for the given identity
    pub fn connect(&self, user_id: &str, token: &str) -> Result<()> {
        self.connection.connect(user_id, token)
    }

    /// Close the connection and cancel any pending reconnect
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn metrics(&self) -> Metrics {
        self.connection.metrics()
    }

    /// Submit outbound work; see [`SendPipeline::submit`]
    pub fn submit(&self, kind: OutboundKind, payload: Value) -> OutboundEnvelope {
        self.pipeline.submit(kind, payload)
    }

    /// Re-attempt a terminally failed envelope
    pub fn retry(&self, envelope_id: &str) -> Result<OutboundEnvelope> {
        self.pipeline.retry(envelope_id)
    }

    /// Delivery status of a tracked envelope
    pub fn delivery_status(&self, envelope_id: &str) -> Option<DeliveryStatus> {
        self.pipeline.status(envelope_id)
    }

    /// Run a drain pass right now
    pub async fn sync_now(&self) -> SyncReport {
        self.worker.sync().await
    }

    /// Subscribe to every inbound chat message
    pub fn on_message(
        &self,
        callback: impl Fn(&MessagePayload) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.registry.subscribe(Topic::Messages, move |event| {
            if let ServerEvent::Message(payload) = event {
                callback(payload);
            }
        })
    }

    /// Subscribe to connection state changes
    pub fn on_connection_state(
        &self,
        callback: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> StateSubscription {
        self.connection.on_state_change(callback)
    }

    /// Subscribe to typing indicators for one conversation
    pub fn on_typing(
        &self,
        conversation_id: impl Into<String>,
        callback: impl Fn(&TypingPayload) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.registry
            .subscribe(Topic::Typing(Some(conversation_id.into())), move |event| {
                if let ServerEvent::Typing(payload) = event {
                    callback(payload);
                }
            })
    }

    /// Subscribe to read receipts for one conversation
    pub fn on_read_status(
        &self,
        conversation_id: impl Into<String>,
        callback: impl Fn(&ReadPayload) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.registry.subscribe(
            Topic::ReadStatus(Some(conversation_id.into())),
            move |event| {
                if let ServerEvent::Read(payload) = event {
                    callback(payload);
                }
            },
        )
    }

    /// Subscribe to group membership/metadata events for one conversation
    pub fn on_group_event(
        &self,
        conversation_id: impl Into<String>,
        callback: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.registry
            .subscribe(Topic::Group(Some(conversation_id.into())), callback)
    }

    /// Subscribe to terminal delivery failures
    ///
    /// Fires when the queue evicts an operation for age or attempt
    /// exhaustion; these are the only user-visible failures this layer
    /// produces.
    pub fn on_delivery_failure(
        &self,
        callback: impl Fn(&OutboundEnvelope) + Send + Sync + 'static,
    ) -> FailureSubscription {
        self.pipeline.on_delivery_failure(callback)
    }

    /// Tear everything down
    pub async fn shutdown(self) {
        debug!("shutting down realtime client");
        self.connection.disconnect();
        self.sync_task.abort();
    }
}

async fn run_sync_loop(
    worker: Arc<OfflineSyncWorker>,
    notify: Arc<Notify>,
    interval: Option<Duration>,
) {
    loop {
        match interval {
            Some(period) => {
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(period) => {}
                }
            }
            None => notify.notified().await,
        }
        worker.sync().await;
    }
}
