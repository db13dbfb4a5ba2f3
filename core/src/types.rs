/// Shared types for the messaging core
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One direct message, immutable once created.
/// Ordering is by `created_at` ascending, ties broken by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// True if the message is between `a` and `b`, in either direction
    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    /// Sort key for thread ordering
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, &self.id)
    }
}

/// Summary of one conversation thread (for the list view)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    /// The other party's user id
    pub peer_id: String,
    /// Last exchanged message, if any
    pub last_message: Option<Message>,
}

/// Public profile of a user, served by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub bio: Option<String>,
}

/// Operations reported by the backend change stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
}

/// Notification that a persisted message changed.
/// The change stream is not pre-filtered per conversation; receivers must
/// apply `involves` before acting on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub operation: ChangeOp,
    pub message: Message,
}

impl ChangeEvent {
    pub fn involves(&self, a: &str, b: &str) -> bool {
        self.message.involves(a, b)
    }
}

/// Ephemeral payloads published over a conversation topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastPayload {
    /// Typing presence signal
    Typing { sender_id: String, typing: bool },
}

impl BroadcastPayload {
    pub fn sender_id(&self) -> &str {
        match self {
            BroadcastPayload::Typing { sender_id, .. } => sender_id,
        }
    }
}

/// Snapshot of the ephemeral presence state for the active conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceView {
    /// The active peer is currently typing
    pub remote_typing: bool,
    /// Realtime delivery is lost; state converges via polling only
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str, receiver: &str) -> Message {
        Message {
            id: "m1".to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: "hi".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_involves_is_symmetric() {
        let m = msg("u1", "u2");
        assert!(m.involves("u1", "u2"));
        assert!(m.involves("u2", "u1"));
        assert!(!m.involves("u1", "u3"));
    }

    #[test]
    fn test_broadcast_payload_wire_shape() {
        let payload = BroadcastPayload::Typing {
            sender_id: "u2".to_string(),
            typing: true,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains(r#""type":"typing""#));
        let back: BroadcastPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
    }

    #[test]
    fn test_change_event_wire_shape() {
        let event = ChangeEvent {
            operation: ChangeOp::Insert,
            message: msg("u1", "u2"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""operation":"insert""#));
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
