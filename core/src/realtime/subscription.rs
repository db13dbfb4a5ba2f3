/// Per-conversation realtime subscription lifecycle
///
/// One change-event stream plus one broadcast topic per active conversation.
/// The state machine guarantees the previous conversation's transport
/// resources are released before new ones are opened, even when teardown is
/// triggered by an error.
use crate::error::{ChatError, Result};
use crate::realtime::transport::{
    RealtimeEvent, RealtimeTransport, SubscriptionHandle, ENTITY_MESSAGES,
};
use crate::topic::derive_topic;
use crate::types::{BroadcastPayload, ChangeEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum SubscriptionState {
    Idle,
    Subscribing {
        peer_id: String,
    },
    Active {
        peer_id: String,
        topic: String,
        changes: SubscriptionHandle,
        broadcast: SubscriptionHandle,
    },
    TearingDown,
}

pub struct RealtimeSubscription {
    user_id: String,
    transport: Arc<dyn RealtimeTransport>,
    events: mpsc::Sender<RealtimeEvent>,
    state: SubscriptionState,
}

impl RealtimeSubscription {
    pub fn new(
        user_id: String,
        transport: Arc<dyn RealtimeTransport>,
        events: mpsc::Sender<RealtimeEvent>,
    ) -> Self {
        Self {
            user_id,
            transport,
            events,
            state: SubscriptionState::Idle,
        }
    }

    /// Peer of the active subscription, if any
    pub fn active_peer(&self) -> Option<&str> {
        match &self.state {
            SubscriptionState::Active { peer_id, .. } => Some(peer_id),
            _ => None,
        }
    }

    /// Topic of the active subscription, if any
    pub fn active_topic(&self) -> Option<&str> {
        match &self.state {
            SubscriptionState::Active { topic, .. } => Some(topic),
            _ => None,
        }
    }

    /// Stand up the streams for a conversation with `peer_id`.
    /// Any previous subscription is torn down first; on failure the state
    /// is `Idle` and the error is reported as `SubscriptionLost`.
    pub async fn activate(&mut self, peer_id: &str) -> Result<()> {
        self.teardown().await;

        self.state = SubscriptionState::Subscribing {
            peer_id: peer_id.to_string(),
        };
        let topic = derive_topic(&self.user_id, peer_id);

        let changes = match self
            .transport
            .subscribe_changes(ENTITY_MESSAGES, self.events.clone())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.state = SubscriptionState::Idle;
                return Err(ChatError::SubscriptionLost(e.to_string()));
            }
        };

        let broadcast = match self
            .transport
            .subscribe_broadcast(&topic, self.events.clone())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                // Half-open: release the change stream before bailing out
                if let Err(e) = self.transport.unsubscribe(changes).await {
                    warn!("failed to release change stream: {}", e);
                }
                self.state = SubscriptionState::Idle;
                return Err(ChatError::SubscriptionLost(e.to_string()));
            }
        };

        info!("realtime active for peer {} on topic {}", peer_id, topic);
        self.state = SubscriptionState::Active {
            peer_id: peer_id.to_string(),
            topic,
            changes,
            broadcast,
        };
        Ok(())
    }

    /// Release any held transport resources and return to `Idle`.
    /// Unsubscribe failures are logged, not propagated: the state must end
    /// up `Idle` regardless.
    pub async fn teardown(&mut self) {
        let previous = std::mem::replace(&mut self.state, SubscriptionState::TearingDown);
        if let SubscriptionState::Active {
            peer_id,
            changes,
            broadcast,
            ..
        } = previous
        {
            debug!("tearing down realtime for peer {}", peer_id);
            if let Err(e) = self.transport.unsubscribe(changes).await {
                warn!("failed to unsubscribe change stream: {}", e);
            }
            if let Err(e) = self.transport.unsubscribe(broadcast).await {
                warn!("failed to unsubscribe broadcast stream: {}", e);
            }
        }
        self.state = SubscriptionState::Idle;
    }

    /// Relevance filter for change events: the change stream is not
    /// pre-filtered per conversation, so only events between the current
    /// user and the active peer may trigger invalidation.
    pub fn accepts_change(&self, event: &ChangeEvent) -> bool {
        match self.active_peer() {
            Some(peer_id) => event.involves(&self.user_id, peer_id),
            None => false,
        }
    }

    /// Filter for broadcast payloads: only the active topic, and never our
    /// own echo.
    pub fn accepts_broadcast(&self, topic: &str, payload: &BroadcastPayload) -> bool {
        match &self.state {
            SubscriptionState::Active {
                peer_id,
                topic: active_topic,
                ..
            } => topic == active_topic && payload.sender_id() == peer_id,
            _ => false,
        }
    }

    /// Publish a typing signal on the active topic. A no-op without an
    /// active subscription (presence is best-effort).
    pub async fn publish_typing(&self, typing: bool) -> Result<()> {
        let topic = match self.active_topic() {
            Some(topic) => topic.to_string(),
            None => return Ok(()),
        };
        self.transport
            .publish_broadcast(
                &topic,
                BroadcastPayload::Typing {
                    sender_id: self.user_id.clone(),
                    typing,
                },
            )
            .await
    }
}
