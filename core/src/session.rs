/// Per-user chat session: one cooperative event loop
///
/// Commands from the presentation layer, realtime events from the transport,
/// and the two typing timers all interleave on a single task, so ordering
/// and cancellation are explicit. The transport and backend are injected;
/// the session owns their use for its lifetime.
use crate::backend::ChatBackend;
use crate::composer::MessageComposer;
use crate::config::SessionConfig;
use crate::error::{ChatError, Result};
use crate::invalidator::Invalidator;
use crate::realtime::{RealtimeEvent, RealtimeSubscription, RealtimeTransport};
use crate::store::{ConversationStore, MessageThreadStore};
use crate::types::{BroadcastPayload, ConversationSummary, Message, PresenceView, Profile};
use crate::typing::TypingPresence;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const COMMAND_QUEUE_DEPTH: usize = 64;
const REALTIME_QUEUE_DEPTH: usize = 256;

enum SessionCommand {
    SelectPeer {
        peer_id: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateDraft {
        text: String,
        reply: oneshot::Sender<()>,
    },
    Send {
        reply: oneshot::Sender<Result<Option<Message>>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    Close,
}

/// The session event loop. Construct with [`ChatSession::new`] and drive
/// with [`ChatSession::run`], or use [`ChatSession::spawn`].
pub struct ChatSession {
    user_id: String,
    config: SessionConfig,
    commands_rx: mpsc::Receiver<SessionCommand>,
    realtime_rx: mpsc::Receiver<RealtimeEvent>,
    subscription: RealtimeSubscription,
    typing: TypingPresence,
    conversations: ConversationStore,
    thread: MessageThreadStore,
    invalidator: Invalidator,
    composer: MessageComposer,
    active_peer: Arc<RwLock<Option<String>>>,
    draft: Arc<RwLock<String>>,
    presence_tx: watch::Sender<PresenceView>,
    degraded: bool,
}

impl ChatSession {
    pub fn new(
        user_id: impl Into<String>,
        config: SessionConfig,
        backend: Arc<dyn ChatBackend>,
        transport: Arc<dyn RealtimeTransport>,
    ) -> (Self, SessionHandle) {
        let user_id = user_id.into();
        let config = config.normalized();

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (realtime_tx, realtime_rx) = mpsc::channel(REALTIME_QUEUE_DEPTH);
        let (presence_tx, presence_rx) = watch::channel(PresenceView::default());

        let conversations = ConversationStore::new(user_id.clone(), backend.clone());
        let thread = MessageThreadStore::new(user_id.clone(), backend.clone());
        let invalidator = Invalidator::new(conversations.clone(), thread.clone());
        let composer = MessageComposer::new(user_id.clone(), backend.clone());
        let subscription =
            RealtimeSubscription::new(user_id.clone(), transport, realtime_tx);
        let typing = TypingPresence::new(config.typing_idle, config.typing_expiry);

        let active_peer = Arc::new(RwLock::new(None));
        let draft = Arc::new(RwLock::new(String::new()));

        let handle = SessionHandle {
            user_id: user_id.clone(),
            backend,
            commands: commands_tx,
            conversations: conversations.clone(),
            thread: thread.clone(),
            presence_rx,
            active_peer: active_peer.clone(),
            draft: draft.clone(),
        };

        let session = Self {
            user_id,
            config,
            commands_rx,
            realtime_rx,
            subscription,
            typing,
            conversations,
            thread,
            invalidator,
            composer,
            active_peer,
            draft,
            presence_tx,
            degraded: false,
        };

        (session, handle)
    }

    /// Create a session and run it on a spawned task.
    pub fn spawn(
        user_id: impl Into<String>,
        config: SessionConfig,
        backend: Arc<dyn ChatBackend>,
        transport: Arc<dyn RealtimeTransport>,
    ) -> SessionHandle {
        let (session, handle) = Self::new(user_id, config, backend, transport);
        tokio::spawn(session.run());
        handle
    }

    /// Drive the session until it is closed or all handles are dropped.
    pub async fn run(mut self) {
        info!("chat session started for {}", self.user_id);

        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let idle_at = self.typing.idle_deadline();
            let expiry_at = self.typing.expiry_deadline();

            tokio::select! {
                // Realtime traffic and due timers drain before commands, so
                // a command issued after an event or deadline always
                // observes its effects.
                biased;

                maybe = self.realtime_rx.recv() => {
                    if let Some(event) = maybe {
                        self.handle_realtime(event).await;
                    }
                }
                _ = sleep_until_deadline(idle_at) => self.handle_idle_elapsed().await,
                _ = sleep_until_deadline(expiry_at) => self.handle_expiry_elapsed(),
                maybe = self.commands_rx.recv() => {
                    match maybe {
                        Some(SessionCommand::Close) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                _ = poll.tick(), if self.degraded => {
                    debug!("poll refresh while realtime is degraded");
                    self.invalidator.refresh_all().await;
                }
            }
        }

        self.subscription.teardown().await;
        info!("chat session stopped for {}", self.user_id);
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SelectPeer { peer_id, reply } => {
                let result = self.select_peer(peer_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::UpdateDraft { text, reply } => {
                self.update_draft(text).await;
                let _ = reply.send(());
            }
            SessionCommand::Send { reply } => {
                let result = self.send_draft().await;
                let _ = reply.send(result);
            }
            SessionCommand::Refresh { reply } => {
                let result = self.refresh_stores().await;
                let _ = reply.send(result);
            }
            SessionCommand::Close => unreachable!("handled by the run loop"),
        }
    }

    async fn select_peer(&mut self, peer_id: Option<String>) -> Result<()> {
        self.typing.reset();
        self.draft.write().await.clear();
        *self.active_peer.write().await = peer_id.clone();
        self.thread.set_peer(peer_id.clone()).await;

        let peer_id = match peer_id {
            Some(peer_id) => peer_id,
            None => {
                self.subscription.teardown().await;
                self.degraded = false;
                self.publish_presence();
                return Ok(());
            }
        };

        match self.subscription.activate(&peer_id).await {
            Ok(()) => self.degraded = false,
            Err(e) => {
                // Presence degrades; reading and composing stay available
                warn!("realtime unavailable for {}: {}", peer_id, e);
                self.degraded = true;
            }
        }
        self.publish_presence();

        let thread_result = self.thread.refresh().await;
        let list_result = self.conversations.refresh().await;

        // Refresh failures are absorbed while stale data exists; a cold
        // cache escalates so the caller can distinguish empty from failed
        if let Err(e) = thread_result {
            if !self.thread.is_loaded().await {
                return Err(e);
            }
        }
        if let Err(e) = list_result {
            if !self.conversations.is_loaded().await {
                return Err(e);
            }
        }
        Ok(())
    }

    async fn update_draft(&mut self, text: String) {
        let empty = text.is_empty();
        *self.draft.write().await = text;
        if let Some(typing) = self.typing.on_draft_change(Instant::now(), empty) {
            self.publish_typing(typing).await;
        }
    }

    async fn send_draft(&mut self) -> Result<Option<Message>> {
        let peer_id = match self.active_peer.read().await.clone() {
            Some(peer_id) => peer_id,
            None => return Ok(None),
        };
        let draft = self.draft.read().await.clone();
        if draft.trim().is_empty() {
            return Ok(None);
        }

        // Retract typing before the message lands; identical on success
        // and failure
        if let Some(typing) = self.typing.on_send() {
            self.publish_typing(typing).await;
        }

        match self.composer.send(&peer_id, &draft).await {
            Ok(message) => {
                self.draft.write().await.clear();
                // The change event for our own message may lag; refresh now
                self.invalidator.refresh_all().await;
                Ok(message)
            }
            Err(e) => {
                // Draft stays intact for retry
                warn!("send to {} failed: {}", peer_id, e);
                Err(e)
            }
        }
    }

    async fn refresh_stores(&mut self) -> Result<()> {
        let thread_result = self.thread.refresh().await;
        let list_result = self.conversations.refresh().await;
        thread_result.and(list_result)
    }

    async fn handle_realtime(&mut self, first: RealtimeEvent) {
        // Bursts coalesce into a single refresh pass
        let mut pending = vec![first];
        while let Ok(event) = self.realtime_rx.try_recv() {
            pending.push(event);
        }

        let mut invalidate = false;
        for event in pending {
            match event {
                RealtimeEvent::Change(change) => {
                    if self.subscription.accepts_change(&change) {
                        invalidate = true;
                    } else {
                        debug!("change event outside active conversation, ignored");
                    }
                }
                RealtimeEvent::Broadcast { topic, payload } => {
                    if !self.subscription.accepts_broadcast(&topic, &payload) {
                        debug!("broadcast on {} ignored", topic);
                        continue;
                    }
                    let BroadcastPayload::Typing { typing, .. } = payload;
                    self.typing.on_remote_signal(Instant::now(), typing);
                    self.publish_presence();
                }
                RealtimeEvent::Lost { reason } => {
                    warn!("realtime subscription lost: {}", reason);
                    self.subscription.teardown().await;
                    self.degraded = true;
                    self.publish_presence();
                }
            }
        }

        if invalidate {
            self.invalidator.refresh_all().await;
        }
    }

    async fn handle_idle_elapsed(&mut self) {
        if let Some(typing) = self.typing.on_idle_elapsed() {
            self.publish_typing(typing).await;
        }
    }

    fn handle_expiry_elapsed(&mut self) {
        self.typing.on_expiry_elapsed();
        self.publish_presence();
    }

    async fn publish_typing(&self, typing: bool) {
        // Presence is best-effort; a failed publish self-heals on the
        // consumer side via expiry
        if let Err(e) = self.subscription.publish_typing(typing).await {
            debug!("typing publish failed: {}", e);
        }
    }

    fn publish_presence(&self) {
        let view = PresenceView {
            remote_typing: self.typing.remote_typing(),
            degraded: self.degraded,
        };
        self.presence_tx.send_if_modified(|current| {
            if *current != view {
                *current = view;
                true
            } else {
                false
            }
        });
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Exposed surface of a running session. Cloneable; all commands go through
/// the session's queue, all reads come from session-owned state.
#[derive(Clone)]
pub struct SessionHandle {
    user_id: String,
    backend: Arc<dyn ChatBackend>,
    commands: mpsc::Sender<SessionCommand>,
    conversations: ConversationStore,
    thread: MessageThreadStore,
    presence_rx: watch::Receiver<PresenceView>,
    active_peer: Arc<RwLock<Option<String>>>,
    draft: Arc<RwLock<String>>,
}

impl SessionHandle {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Make `peer_id` the active conversation (or clear it with `None`):
    /// tears down the previous subscription, re-keys the thread cache and
    /// loads both stores.
    pub async fn select_peer(&self, peer_id: Option<&str>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::SelectPeer {
                peer_id: peer_id.map(str::to_string),
                reply,
            })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    /// Replace the draft text, driving local typing signals.
    pub async fn update_draft(&self, text: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::UpdateDraft {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)
    }

    /// Send the current draft to the active peer. Returns `Ok(None)` when
    /// there is nothing to send (no peer, or whitespace-only draft). On
    /// failure the draft is preserved.
    pub async fn send(&self) -> Result<Option<Message>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Send { reply })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    /// Manual refresh of both stores (the retry affordance).
    pub async fn refresh(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Refresh { reply })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    /// Stop the session loop and release the transport resources.
    pub async fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close).await;
    }

    /// Conversation list. A freshly selected peer with no history yet shows
    /// up as a view-only entry; it is never written to the store.
    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        let mut conversations = self.conversations.snapshot().await;
        if let Some(peer_id) = self.active_peer.read().await.clone() {
            if !conversations.iter().any(|c| c.peer_id == peer_id) {
                conversations.insert(
                    0,
                    ConversationSummary {
                        peer_id,
                        last_message: None,
                    },
                );
            }
        }
        conversations
    }

    /// Message history of the active conversation, ascending by time.
    pub async fn messages(&self) -> Vec<Message> {
        self.thread.snapshot().await
    }

    pub async fn active_peer(&self) -> Option<String> {
        self.active_peer.read().await.clone()
    }

    pub async fn draft(&self) -> String {
        self.draft.read().await.clone()
    }

    /// Current presence snapshot (remote typing + degraded flag).
    pub fn presence(&self) -> PresenceView {
        self.presence_rx.borrow().clone()
    }

    /// Watch channel for presence changes.
    pub fn presence_watch(&self) -> watch::Receiver<PresenceView> {
        self.presence_rx.clone()
    }

    /// Profile of the active peer, fetched directly from the backend.
    pub async fn peer_profile(&self) -> Result<Option<Profile>> {
        match self.active_peer.read().await.clone() {
            Some(peer_id) => self.backend.get_profile(&peer_id).await,
            None => Ok(None),
        }
    }

    /// Last conversation-list refresh error, if the data shown is stale.
    pub async fn conversation_error(&self) -> Option<ChatError> {
        self.conversations.last_error().await
    }

    /// Last thread refresh error, if the data shown is stale.
    pub async fn thread_error(&self) -> Option<ChatError> {
        self.thread.last_error().await
    }
}
