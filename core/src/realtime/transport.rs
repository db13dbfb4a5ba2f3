/// Transport boundary for the realtime publish/subscribe service
///
/// The transport is an injected dependency, owned by whoever constructs the
/// session; nothing in the core holds a process-wide client. Events are
/// delivered into the subscriber's channel in arrival order per topic; no
/// ordering is guaranteed across topics.
use crate::error::Result;
use crate::types::{BroadcastPayload, ChangeEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Entity types observable on the change stream
pub const ENTITY_MESSAGES: &str = "messages";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Backend change-event stream for one entity type
    Changes { entity_type: String },
    /// Broadcast stream scoped to one topic
    Broadcast { topic: String },
}

/// Owns exactly one underlying transport resource. Deliberately not `Clone`:
/// releasing the resource means surrendering the handle to `unsubscribe`.
#[derive(Debug)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub kind: SubscriptionKind,
}

impl SubscriptionHandle {
    pub fn new(kind: SubscriptionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

/// Events pushed by the transport into the session queue
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// A persisted entity changed (at-least-once, unfiltered per conversation)
    Change(ChangeEvent),
    /// An ephemeral payload arrived on a subscribed topic
    Broadcast {
        topic: String,
        payload: BroadcastPayload,
    },
    /// The transport dropped our subscriptions
    Lost { reason: String },
}

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a change-event stream for one entity type. Resolves once the
    /// transport has acknowledged the subscription.
    async fn subscribe_changes(
        &self,
        entity_type: &str,
        events: mpsc::Sender<RealtimeEvent>,
    ) -> Result<SubscriptionHandle>;

    /// Open a broadcast stream scoped to `topic`.
    async fn subscribe_broadcast(
        &self,
        topic: &str,
        events: mpsc::Sender<RealtimeEvent>,
    ) -> Result<SubscriptionHandle>;

    /// Publish an ephemeral payload to current subscribers of `topic`.
    async fn publish_broadcast(&self, topic: &str, payload: BroadcastPayload) -> Result<()>;

    /// Release the transport resource behind `handle`.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}
