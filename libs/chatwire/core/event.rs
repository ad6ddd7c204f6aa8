//! Wire model: inbound server events and outbound envelopes
//!
//! Frames on the socket are UTF-8 JSON objects of shape `{type, data}`.
//! Inbound frames decode into the closed [`ServerEvent`] enum; unknown
//! `type` tags fail decoding and are dropped by the router. Outbound work is
//! tracked as an [`OutboundEnvelope`] through its delivery lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Routing key for a conversation
pub type ConversationId = String;

/// A chat message as delivered by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Server-assigned message id
    pub id: String,
    /// Echo of the sender's client-generated id, when present. Used to
    /// reconcile an optimistic record with its confirmed counterpart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub conversation_id: ConversationId,
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Typing indicator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: ConversationId,
    pub user_id: String,
    pub is_typing: bool,
}

/// Read receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPayload {
    pub conversation_id: ConversationId,
    pub user_id: String,
    #[serde(default)]
    pub message_ids: Vec<String>,
}

/// Group membership/metadata change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Closed set of inbound server events
///
/// The tag set is the wire protocol's `type` field. Adding a server-side
/// event type means adding a variant here; there is no string fallthrough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Message(MessagePayload),
    Typing(TypingPayload),
    Read(ReadPayload),
    GroupCreated(GroupPayload),
    GroupUpdated(GroupPayload),
    MemberAdded(GroupPayload),
    MemberRemoved(GroupPayload),
    UserLeft(GroupPayload),
}

impl ServerEvent {
    /// The wire `type` tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Message(_) => "message",
            ServerEvent::Typing(_) => "typing",
            ServerEvent::Read(_) => "read",
            ServerEvent::GroupCreated(_) => "group_created",
            ServerEvent::GroupUpdated(_) => "group_updated",
            ServerEvent::MemberAdded(_) => "member_added",
            ServerEvent::MemberRemoved(_) => "member_removed",
            ServerEvent::UserLeft(_) => "user_left",
        }
    }

    /// The conversation this event belongs to
    pub fn conversation_id(&self) -> &str {
        match self {
            ServerEvent::Message(p) => &p.conversation_id,
            ServerEvent::Typing(p) => &p.conversation_id,
            ServerEvent::Read(p) => &p.conversation_id,
            ServerEvent::GroupCreated(p)
            | ServerEvent::GroupUpdated(p)
            | ServerEvent::MemberAdded(p)
            | ServerEvent::MemberRemoved(p)
            | ServerEvent::UserLeft(p) => &p.conversation_id,
        }
    }

    pub fn is_group_event(&self) -> bool {
        matches!(
            self,
            ServerEvent::GroupCreated(_)
                | ServerEvent::GroupUpdated(_)
                | ServerEvent::MemberAdded(_)
                | ServerEvent::MemberRemoved(_)
                | ServerEvent::UserLeft(_)
        )
    }
}

/// Kind of outbound work an envelope carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    Message,
    Typing,
    Read,
    GroupOp,
}

impl OutboundKind {
    /// The wire `type` tag used on the live socket path
    pub fn frame_type(&self) -> &'static str {
        match self {
            OutboundKind::Message => "message",
            OutboundKind::Typing => "typing",
            OutboundKind::Read => "read",
            OutboundKind::GroupOp => "group_op",
        }
    }

    /// The HTTP endpoint used on the queued fallback path
    pub fn endpoint(&self) -> &'static str {
        match self {
            OutboundKind::Message => "/api/messages",
            OutboundKind::Typing => "/api/typing",
            OutboundKind::Read => "/api/conversations/read",
            OutboundKind::GroupOp => "/api/groups",
        }
    }

    /// The HTTP method used on the queued fallback path
    pub fn method(&self) -> &'static str {
        "POST"
    }

    /// Inverse of [`OutboundKind::endpoint`], for rebuilding a record from a
    /// persisted queue item
    pub fn from_endpoint(endpoint: &str) -> Option<OutboundKind> {
        match endpoint {
            "/api/messages" => Some(OutboundKind::Message),
            "/api/typing" => Some(OutboundKind::Typing),
            "/api/conversations/read" => Some(OutboundKind::Read),
            "/api/groups" => Some(OutboundKind::GroupOp),
            _ => None,
        }
    }
}

/// Delivery lifecycle of an outbound envelope
///
/// The live socket path is at-most-once: a `Sent` envelope may never be
/// confirmed, and that is not a failure. The queued fallback path is
/// at-least-once. `Failed` is terminal and only ever reached through
/// retry/age exhaustion on the queue; it requires an explicit `retry()` to
/// leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Optimistic record exists; nothing has left the process yet, or the
    /// envelope is resident in the persistent queue.
    Sending,
    /// Handed to an open transport. Not proof of server receipt.
    Sent,
    /// The server echoed a correlated event back.
    Confirmed,
    /// Retries or retention exhausted. Terminal until retried.
    Failed,
}

/// An outbound unit of work tracked through its delivery lifecycle
#[derive(Debug, Clone)]
pub struct OutboundEnvelope {
    /// Client-generated id, unique per envelope
    pub id: String,
    pub kind: OutboundKind,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
}

impl OutboundEnvelope {
    pub fn new(kind: OutboundKind, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            created_at: Utc::now(),
            attempt_count: 0,
            last_attempt_at: None,
            status: DeliveryStatus::Sending,
        }
    }

    /// Payload with the client id injected, as sent on either path
    ///
    /// The server echoes `clientId` back on the confirmation event, which is
    /// the only correlation mechanism the protocol has.
    pub fn wire_data(&self) -> Value {
        let mut data = self.payload.clone();
        if let Some(object) = data.as_object_mut() {
            object.insert("clientId".to_string(), Value::String(self.id.clone()));
        }
        data
    }

    /// The `{type, data}` frame for the live socket path
    pub fn wire_frame(&self) -> String {
        serde_json::json!({
            "type": self.kind.frame_type(),
            "data": self.wire_data(),
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_typing_frame() {
        let raw = r#"{"type":"typing","data":{"conversationId":"c1","userId":"u2","isTyping":true}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();

        match &event {
            ServerEvent::Typing(p) => {
                assert_eq!(p.conversation_id, "c1");
                assert_eq!(p.user_id, "u2");
                assert!(p.is_typing);
            }
            other => panic!("expected typing event, got {other:?}"),
        }
        assert_eq!(event.kind(), "typing");
        assert_eq!(event.conversation_id(), "c1");
    }

    #[test]
    fn decodes_message_frame_with_client_id() {
        let raw = r#"{"type":"message","data":{"id":"m9","clientId":"local-1","conversationId":"c1","senderId":"u1","content":"hi","timestamp":"2026-08-01T12:00:00Z"}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();

        match event {
            ServerEvent::Message(p) => {
                assert_eq!(p.id, "m9");
                assert_eq!(p.client_id.as_deref(), Some("local-1"));
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[test]
    fn group_tags_use_snake_case() {
        let raw = r#"{"type":"member_added","data":{"conversationId":"g1","memberId":"u7"}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        assert!(event.is_group_event());
        assert_eq!(event.kind(), "member_added");
    }

    #[test]
    fn unknown_type_tag_fails_to_decode() {
        let raw = r#"{"type":"presence","data":{"userId":"u1"}}"#;
        assert!(serde_json::from_str::<ServerEvent>(raw).is_err());
    }

    #[test]
    fn wire_frame_embeds_client_id() {
        let envelope = OutboundEnvelope::new(
            OutboundKind::Message,
            serde_json::json!({"conversationId": "c1", "content": "hello"}),
        );

        let frame: Value = serde_json::from_str(&envelope.wire_frame()).unwrap();
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["data"]["clientId"], Value::String(envelope.id.clone()));
        assert_eq!(frame["data"]["content"], "hello");
    }

    #[test]
    fn new_envelope_starts_sending_with_no_attempts() {
        let envelope = OutboundEnvelope::new(OutboundKind::Typing, serde_json::json!({}));
        assert_eq!(envelope.status, DeliveryStatus::Sending);
        assert_eq!(envelope.attempt_count, 0);
        assert!(envelope.last_attempt_at.is_none());
    }
}
