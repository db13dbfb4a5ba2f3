/// Refresh-and-replace caches over the persistence collaborator
///
/// Every successful refresh fully replaces prior state for its key; there is
/// no partial merge, so a missed change event can never leave the cache
/// diverged. A failed refresh keeps the previous data visible and records
/// the error: stale-but-available beats empty.
use crate::backend::ChatBackend;
use crate::error::{ChatError, Result};
use crate::types::{ConversationSummary, Message};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Conversation list for the current user, keyed by `user_id`
#[derive(Clone)]
pub struct ConversationStore {
    user_id: String,
    backend: Arc<dyn ChatBackend>,
    state: Arc<RwLock<ListState>>,
}

#[derive(Default)]
struct ListState {
    conversations: Vec<ConversationSummary>,
    loaded: bool,
    last_error: Option<ChatError>,
}

impl ConversationStore {
    pub fn new(user_id: String, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            user_id,
            backend,
            state: Arc::new(RwLock::new(ListState::default())),
        }
    }

    /// Re-query the backend and replace the cached list.
    pub async fn refresh(&self) -> Result<()> {
        match self.backend.list_conversations(&self.user_id).await {
            Ok(conversations) => {
                let mut state = self.state.write().await;
                state.conversations = conversations;
                state.loaded = true;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("conversation refresh failed: {}", e);
                let mut state = self.state.write().await;
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub async fn snapshot(&self) -> Vec<ConversationSummary> {
        self.state.read().await.conversations.clone()
    }

    /// Distinguishes "empty because nothing loaded yet" from "empty with data"
    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.loaded
    }

    pub async fn last_error(&self) -> Option<ChatError> {
        self.state.read().await.last_error.clone()
    }
}

/// Message history for the active conversation, keyed by `(user_id, peer_id)`
#[derive(Clone)]
pub struct MessageThreadStore {
    user_id: String,
    backend: Arc<dyn ChatBackend>,
    state: Arc<RwLock<ThreadState>>,
}

#[derive(Default)]
struct ThreadState {
    peer_id: Option<String>,
    messages: Vec<Message>,
    loaded: bool,
    last_error: Option<ChatError>,
}

impl MessageThreadStore {
    pub fn new(user_id: String, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            user_id,
            backend,
            state: Arc::new(RwLock::new(ThreadState::default())),
        }
    }

    /// Re-key the cache to a new peer, dropping the previous thread.
    pub async fn set_peer(&self, peer_id: Option<String>) {
        let mut state = self.state.write().await;
        state.peer_id = peer_id;
        state.messages.clear();
        state.loaded = false;
        state.last_error = None;
    }

    pub async fn peer_id(&self) -> Option<String> {
        self.state.read().await.peer_id.clone()
    }

    /// Re-query the backend for the current peer and replace the thread.
    /// If the peer changed while the request was in flight, the late
    /// response is discarded: the cache key decides at write time.
    pub async fn refresh(&self) -> Result<()> {
        let peer_id = match self.peer_id().await {
            Some(peer_id) => peer_id,
            None => return Ok(()),
        };

        match self.backend.list_messages(&self.user_id, &peer_id).await {
            Ok(mut messages) => {
                messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
                let mut state = self.state.write().await;
                if state.peer_id.as_deref() != Some(peer_id.as_str()) {
                    debug!("discarding stale thread refresh for {}", peer_id);
                    return Ok(());
                }
                state.messages = messages;
                state.loaded = true;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("thread refresh for {} failed: {}", peer_id, e);
                let mut state = self.state.write().await;
                if state.peer_id.as_deref() == Some(peer_id.as_str()) {
                    state.last_error = Some(e.clone());
                }
                Err(e)
            }
        }
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.loaded
    }

    pub async fn last_error(&self) -> Option<ChatError> {
        self.state.read().await.last_error.clone()
    }
}
