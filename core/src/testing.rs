/// In-memory collaborators for tests
///
/// `MemoryBackend` and `MemoryTransport` implement the two external
/// boundaries with enough instrumentation to assert on call counts, handle
/// lifecycles and published payloads. Broadcast payloads round-trip through
/// JSON so the wire shape is exercised on every publish.
use crate::backend::ChatBackend;
use crate::error::{ChatError, Result};
use crate::realtime::transport::{
    RealtimeEvent, RealtimeTransport, SubscriptionHandle, SubscriptionKind,
};
use crate::types::{BroadcastPayload, ChangeEvent, ChangeOp, ConversationSummary, Message, Profile};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

// ─── Backend ─────────────────────────────────────────────────────────────────

pub struct MemoryBackend {
    state: Arc<RwLock<BackendState>>,
    unavailable: AtomicBool,
    base_time: DateTime<Utc>,
    seq: AtomicI64,
    list_conversation_calls: AtomicUsize,
    list_message_calls: AtomicUsize,
    create_message_calls: AtomicUsize,
}

#[derive(Default)]
struct BackendState {
    messages: Vec<Message>,
    profiles: HashMap<String, Profile>,
    latency: Duration,
    change_feed: Option<Arc<MemoryTransport>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BackendState::default())),
            unavailable: AtomicBool::new(false),
            base_time: Utc::now(),
            seq: AtomicI64::new(0),
            list_conversation_calls: AtomicUsize::new(0),
            list_message_calls: AtomicUsize::new(0),
            create_message_calls: AtomicUsize::new(0),
        }
    }

    /// Route change events for created messages into `transport`, the way a
    /// real backend feeds its change stream.
    pub async fn set_change_feed(&self, transport: Arc<MemoryTransport>) {
        self.state.write().await.change_feed = Some(transport);
    }

    /// Fail every call with `BackendUnavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call; combine with a paused runtime to park requests.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    pub async fn set_profile(&self, profile: Profile) {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.user_id.clone(), profile);
    }

    /// Insert a message directly, bypassing counters and the change feed.
    pub async fn seed_message(&self, sender_id: &str, receiver_id: &str, content: &str) -> Message {
        let message = self.next_message(sender_id, receiver_id, content);
        self.state.write().await.messages.push(message.clone());
        message
    }

    pub fn list_conversation_calls(&self) -> usize {
        self.list_conversation_calls.load(Ordering::SeqCst)
    }

    pub fn list_message_calls(&self) -> usize {
        self.list_message_calls.load(Ordering::SeqCst)
    }

    pub fn create_message_calls(&self) -> usize {
        self.create_message_calls.load(Ordering::SeqCst)
    }

    /// Timestamps advance by one millisecond per message so ordering is
    /// deterministic even under a paused test clock.
    fn next_message(&self, sender_id: &str, receiver_id: &str, content: &str) -> Message {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        Message {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            created_at: self.base_time + ChronoDuration::milliseconds(seq),
        }
    }

    async fn checkpoint(&self) -> Result<()> {
        let latency = self.state.read().await.latency;
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChatError::BackendUnavailable("backend offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        self.list_conversation_calls.fetch_add(1, Ordering::SeqCst);
        self.checkpoint().await?;

        let state = self.state.read().await;
        let mut last_by_peer: HashMap<String, Message> = HashMap::new();
        for message in &state.messages {
            let peer_id = if message.sender_id == user_id {
                message.receiver_id.clone()
            } else if message.receiver_id == user_id {
                message.sender_id.clone()
            } else {
                continue;
            };
            let replace = last_by_peer
                .get(&peer_id)
                .map(|current| message.sort_key() > current.sort_key())
                .unwrap_or(true);
            if replace {
                last_by_peer.insert(peer_id, message.clone());
            }
        }

        let mut conversations: Vec<ConversationSummary> = last_by_peer
            .into_iter()
            .map(|(peer_id, message)| ConversationSummary {
                peer_id,
                last_message: Some(message),
            })
            .collect();
        // Most recently active first
        conversations.sort_by(|a, b| {
            let ka = a.last_message.as_ref().map(Message::sort_key);
            let kb = b.last_message.as_ref().map(Message::sort_key);
            kb.cmp(&ka)
        });
        Ok(conversations)
    }

    async fn list_messages(&self, user_id: &str, peer_id: &str) -> Result<Vec<Message>> {
        self.list_message_calls.fetch_add(1, Ordering::SeqCst);
        self.checkpoint().await?;

        let state = self.state.read().await;
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.involves(user_id, peer_id))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(messages)
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.checkpoint().await?;
        Ok(self.state.read().await.profiles.get(user_id).cloned())
    }

    async fn create_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<Message> {
        self.create_message_calls.fetch_add(1, Ordering::SeqCst);
        self.checkpoint().await?;

        if content.trim().is_empty() {
            return Err(ChatError::ValidationFailed(
                "message content is empty".to_string(),
            ));
        }

        let message = self.next_message(sender_id, receiver_id, content);
        let feed = {
            let mut state = self.state.write().await;
            state.messages.push(message.clone());
            state.change_feed.clone()
        };
        if let Some(transport) = feed {
            transport
                .emit_change(ChangeEvent {
                    operation: ChangeOp::Insert,
                    message: message.clone(),
                })
                .await;
        }
        Ok(message)
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

pub struct MemoryTransport {
    inner: Arc<RwLock<TransportInner>>,
    fail_subscribe: AtomicBool,
}

#[derive(Default)]
struct TransportInner {
    change_subs: HashMap<Uuid, mpsc::Sender<RealtimeEvent>>,
    topic_subs: HashMap<Uuid, (String, mpsc::Sender<RealtimeEvent>)>,
    /// Chronological subscribe/unsubscribe record for lifecycle assertions
    log: Vec<String>,
    published: Vec<(String, BroadcastPayload)>,
    max_live: usize,
}

impl TransportInner {
    fn live(&self) -> usize {
        self.change_subs.len() + self.topic_subs.len()
    }

    fn note(&mut self, action: &str, what: &str) {
        self.log.push(format!("{} {}", action, what));
        self.max_live = self.max_live.max(self.live());
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(TransportInner::default())),
            fail_subscribe: AtomicBool::new(false),
        }
    }

    /// Reject subscription attempts until cleared.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Deliver a change event to every change-stream subscriber.
    pub async fn emit_change(&self, event: ChangeEvent) {
        let senders: Vec<_> = {
            let inner = self.inner.read().await;
            inner.change_subs.values().cloned().collect()
        };
        for sender in senders {
            let _ = sender.send(RealtimeEvent::Change(event.clone())).await;
        }
    }

    /// Drop every subscription and notify subscribers, simulating a
    /// transport outage.
    pub async fn drop_subscriptions(&self, reason: &str) {
        let senders: Vec<_> = {
            let mut inner = self.inner.write().await;
            let mut senders: Vec<_> = inner.change_subs.drain().map(|(_, tx)| tx).collect();
            senders.extend(inner.topic_subs.drain().map(|(_, (_, tx))| tx));
            inner.log.push("drop all".to_string());
            senders
        };
        for sender in senders {
            let _ = sender
                .send(RealtimeEvent::Lost {
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    pub async fn live_handles(&self) -> usize {
        self.inner.read().await.live()
    }

    /// High-water mark of concurrently open handles.
    pub async fn max_live_handles(&self) -> usize {
        self.inner.read().await.max_live
    }

    pub async fn topic_subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .read()
            .await
            .topic_subs
            .values()
            .filter(|(t, _)| t == topic)
            .count()
    }

    pub async fn event_log(&self) -> Vec<String> {
        self.inner.read().await.log.clone()
    }

    pub async fn published(&self) -> Vec<(String, BroadcastPayload)> {
        self.inner.read().await.published.clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(ChatError::SubscriptionLost("transport offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeTransport for MemoryTransport {
    async fn subscribe_changes(
        &self,
        entity_type: &str,
        events: mpsc::Sender<RealtimeEvent>,
    ) -> Result<SubscriptionHandle> {
        self.check_available()?;
        let handle = SubscriptionHandle::new(SubscriptionKind::Changes {
            entity_type: entity_type.to_string(),
        });
        let mut inner = self.inner.write().await;
        inner.change_subs.insert(handle.id, events);
        inner.note("subscribe", &format!("changes:{}", entity_type));
        Ok(handle)
    }

    async fn subscribe_broadcast(
        &self,
        topic: &str,
        events: mpsc::Sender<RealtimeEvent>,
    ) -> Result<SubscriptionHandle> {
        self.check_available()?;
        let handle = SubscriptionHandle::new(SubscriptionKind::Broadcast {
            topic: topic.to_string(),
        });
        let mut inner = self.inner.write().await;
        inner
            .topic_subs
            .insert(handle.id, (topic.to_string(), events));
        inner.note("subscribe", topic);
        Ok(handle)
    }

    async fn publish_broadcast(&self, topic: &str, payload: BroadcastPayload) -> Result<()> {
        // Round-trip through JSON: subscribers get what the wire would carry
        let encoded = serde_json::to_string(&payload)
            .map_err(|e| ChatError::ValidationFailed(e.to_string()))?;
        let decoded: BroadcastPayload = serde_json::from_str(&encoded)
            .map_err(|e| ChatError::ValidationFailed(e.to_string()))?;

        let senders: Vec<_> = {
            let mut inner = self.inner.write().await;
            inner.published.push((topic.to_string(), decoded.clone()));
            inner
                .topic_subs
                .values()
                .filter(|(t, _)| t == topic)
                .map(|(_, tx)| tx.clone())
                .collect()
        };
        for sender in senders {
            let _ = sender
                .send(RealtimeEvent::Broadcast {
                    topic: topic.to_string(),
                    payload: decoded.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        let mut inner = self.inner.write().await;
        let what = match &handle.kind {
            SubscriptionKind::Changes { entity_type } => format!("changes:{}", entity_type),
            SubscriptionKind::Broadcast { topic } => topic.clone(),
        };
        inner.change_subs.remove(&handle.id);
        inner.topic_subs.remove(&handle.id);
        inner.note("unsubscribe", &what);
        Ok(())
    }
}
