/// Cache invalidation: change events become store refreshes
///
/// A message creation affects both the active thread and the conversation
/// list's last-message ordering, so a relevant event refreshes both.
/// Refreshes are idempotent full replacements (at-least-once is fine), and
/// failures are absorbed: realtime is an optimization, not the source of
/// truth.
use crate::store::{ConversationStore, MessageThreadStore};
use tracing::warn;

pub struct Invalidator {
    conversations: ConversationStore,
    thread: MessageThreadStore,
}

impl Invalidator {
    pub fn new(conversations: ConversationStore, thread: MessageThreadStore) -> Self {
        Self {
            conversations,
            thread,
        }
    }

    /// Refresh both caches. Failures are logged and recorded on the stores
    /// themselves; prior data stays visible either way.
    pub async fn refresh_all(&self) {
        if let Err(e) = self.thread.refresh().await {
            warn!("thread invalidation refresh failed: {}", e);
        }
        if let Err(e) = self.conversations.refresh().await {
            warn!("conversation invalidation refresh failed: {}", e);
        }
    }
}
