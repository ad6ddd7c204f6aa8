//! Outbound delivery pipeline
//!
//! Single entry point for sending work to the backend. Every submission
//! materializes an optimistic record synchronously, then either rides the
//! live socket or falls back to the persistent queue. The two paths are
//! exclusive: an envelope handed to the socket is never also enqueued.

use crate::core::connection::ConnectionManager;
use crate::core::event::{DeliveryStatus, OutboundEnvelope, OutboundKind, ServerEvent};
use crate::core::registry::{ListenerRegistry, Subscription};
use crate::error::{ChatWireError, Result};
use crate::queue::store::{PendingQueueItem, PersistentQueueStore};
use crate::queue::sync::SyncOutcomes;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Subscription to terminal delivery failures
pub type FailureSubscription = Subscription<(), OutboundEnvelope>;

/// Accepts outbound envelopes and tracks them to resolution
pub struct SendPipeline {
    connection: Arc<ConnectionManager>,
    store: Arc<PersistentQueueStore>,
    records: Mutex<HashMap<String, OutboundEnvelope>>,
    failure_listeners: ListenerRegistry<(), OutboundEnvelope>,
}

impl SendPipeline {
    pub fn new(connection: Arc<ConnectionManager>, store: Arc<PersistentQueueStore>) -> Self {
        Self {
            connection,
            store,
            records: Mutex::new(HashMap::new()),
            failure_listeners: ListenerRegistry::new(),
        }
    }

    /// Submit outbound work
    ///
    /// Returns the optimistic record synchronously; the caller never waits
    /// on a network round trip to see its own message. `Sent` means the
    /// frame left on an open socket (unacknowledged); `Sending` means it is
    /// resident in the persistent queue awaiting the sync worker.
    pub fn submit(&self, kind: OutboundKind, payload: Value) -> OutboundEnvelope {
        let mut envelope = OutboundEnvelope::new(kind, payload);

        // Materialize the optimistic record before any I/O.
        self.records
            .lock()
            .insert(envelope.id.clone(), envelope.clone());

        self.attempt(&mut envelope);
        envelope
    }

    /// Re-attempt a terminally failed envelope
    ///
    /// Clears the failure but keeps the attempt history for observability.
    pub fn retry(&self, id: &str) -> Result<OutboundEnvelope> {
        let mut envelope = self
            .records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ChatWireError::UnknownEnvelope(id.to_string()))?;

        if envelope.status != DeliveryStatus::Failed {
            return Err(ChatWireError::InvalidState(format!(
                "retry() on envelope {id} with status {:?}",
                envelope.status
            )));
        }

        envelope.status = DeliveryStatus::Sending;
        self.attempt(&mut envelope);
        Ok(envelope)
    }

    /// Delivery status of a tracked envelope
    pub fn status(&self, id: &str) -> Option<DeliveryStatus> {
        self.records.lock().get(id).map(|envelope| envelope.status)
    }

    /// Full tracked record of an envelope
    pub fn envelope(&self, id: &str) -> Option<OutboundEnvelope> {
        self.records.lock().get(id).cloned()
    }

    /// Feed an inbound event through the acknowledgement path
    ///
    /// A `message` event whose `clientId` matches a tracked envelope is the
    /// server's confirmation of that envelope. There is no ack deadline:
    /// an envelope that is never confirmed simply stays `Sent`.
    pub fn observe_inbound(&self, event: &ServerEvent) {
        let ServerEvent::Message(payload) = event else {
            return;
        };
        let Some(client_id) = &payload.client_id else {
            return;
        };

        let mut records = self.records.lock();
        if let Some(envelope) = records.get_mut(client_id) {
            if envelope.status != DeliveryStatus::Confirmed {
                debug!(
                    "envelope {} confirmed by server message {}",
                    client_id, payload.id
                );
                envelope.status = DeliveryStatus::Confirmed;
            }
        }
    }

    /// Register a terminal-failure listener
    pub fn on_delivery_failure(
        &self,
        listener: impl Fn(&OutboundEnvelope) + Send + Sync + 'static,
    ) -> FailureSubscription {
        self.failure_listeners.subscribe((), listener)
    }

    /// One delivery attempt: live socket first, persistent queue second
    fn attempt(&self, envelope: &mut OutboundEnvelope) {
        envelope.attempt_count += 1;
        envelope.last_attempt_at = Some(Utc::now());

        if self.connection.send(envelope.wire_frame()) {
            envelope.status = DeliveryStatus::Sent;
            debug!("envelope {} handed to open transport", envelope.id);
        } else {
            match self.store.enqueue(queue_item(envelope)) {
                Ok(_) => {
                    envelope.status = DeliveryStatus::Sending;
                    debug!("envelope {} queued for offline delivery", envelope.id);
                }
                Err(e) => {
                    // Nowhere to put it: not on the wire, not on disk.
                    error!("failed to persist envelope {}: {e}", envelope.id);
                    envelope.status = DeliveryStatus::Failed;
                    self.failure_listeners.dispatch(&(), envelope);
                }
            }
        }

        let mut records = self.records.lock();
        match records.get_mut(&envelope.id) {
            // An ack can land between the wire send and this bookkeeping;
            // never downgrade a confirmation.
            Some(record) if record.status == DeliveryStatus::Confirmed => {
                envelope.status = DeliveryStatus::Confirmed;
            }
            _ => {
                records.insert(envelope.id.clone(), envelope.clone());
            }
        }
    }

    fn resolve(&self, id: &str, status: DeliveryStatus) -> Option<OutboundEnvelope> {
        let mut records = self.records.lock();
        let envelope = records.get_mut(id)?;
        envelope.status = status;
        Some(envelope.clone())
    }
}

impl SyncOutcomes for SendPipeline {
    fn delivered(&self, item: &PendingQueueItem) {
        if self.resolve(&item.id, DeliveryStatus::Confirmed).is_none() {
            debug!("delivered queue item {} has no tracked envelope", item.id);
        }
    }

    fn failed(&self, item: &PendingQueueItem) {
        let envelope = self
            .resolve(&item.id, DeliveryStatus::Failed)
            .unwrap_or_else(|| {
                // Item predates this process; rebuild enough of a record
                // for the notification to be useful.
                warn!("terminal failure for untracked queue item {}", item.id);
                OutboundEnvelope {
                    id: item.id.clone(),
                    kind: OutboundKind::from_endpoint(&item.endpoint)
                        .unwrap_or(OutboundKind::Message),
                    payload: item.data.clone(),
                    created_at: item.timestamp,
                    attempt_count: item.retry_count,
                    last_attempt_at: item.last_attempt,
                    status: DeliveryStatus::Failed,
                }
            });
        self.failure_listeners.dispatch(&(), &envelope);
    }
}

fn queue_item(envelope: &OutboundEnvelope) -> PendingQueueItem {
    PendingQueueItem {
        id: envelope.id.clone(),
        timestamp: envelope.created_at,
        endpoint: envelope.kind.endpoint().to_string(),
        method: envelope.kind.method().to_string(),
        data: envelope.wire_data(),
        retry_count: 0,
        last_attempt: None,
    }
}
