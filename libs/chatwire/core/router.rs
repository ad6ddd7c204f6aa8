//! Inbound frame decoding and fan-out
//!
//! Every text frame from the socket lands here. Decoding failures
//! (malformed JSON, unknown `type` tags) are logged and dropped; they never
//! reach subscribers and never disturb the connection.

use crate::core::event::ServerEvent;
use crate::core::registry::{EventRegistry, Topic};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decodes inbound frames and dispatches them to subscribers
pub struct EventRouter {
    registry: Arc<EventRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Decode one frame and deliver it
    ///
    /// Global event-class subscribers always receive the event; events that
    /// carry a conversation id are additionally delivered to that
    /// conversation's subscribers.
    pub fn route(&self, raw: &str) {
        let event: ServerEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("dropping undecodable frame: {e}");
                return;
            }
        };

        let delivered = self.dispatch(&event);
        debug!(
            "routed {} event for {} to {} listener(s)",
            event.kind(),
            event.conversation_id(),
            delivered
        );
    }

    fn dispatch(&self, event: &ServerEvent) -> usize {
        let conversation = event.conversation_id().to_string();

        match event {
            ServerEvent::Message(_) => self.registry.dispatch(&Topic::Messages, event),
            ServerEvent::Typing(_) => {
                self.registry.dispatch(&Topic::Typing(None), event)
                    + self
                        .registry
                        .dispatch(&Topic::Typing(Some(conversation)), event)
            }
            ServerEvent::Read(_) => {
                self.registry.dispatch(&Topic::ReadStatus(None), event)
                    + self
                        .registry
                        .dispatch(&Topic::ReadStatus(Some(conversation)), event)
            }
            ServerEvent::GroupCreated(_)
            | ServerEvent::GroupUpdated(_)
            | ServerEvent::MemberAdded(_)
            | ServerEvent::MemberRemoved(_)
            | ServerEvent::UserLeft(_) => {
                self.registry.dispatch(&Topic::Group(None), event)
                    + self.registry.dispatch(&Topic::Group(Some(conversation)), event)
            }
        }
    }
}
