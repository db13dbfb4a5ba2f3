/// Persistence collaborator boundary
///
/// The core never stores messages itself; it refreshes from and writes
/// through this trait. Implementations live outside the crate (the
/// `testing` module ships an in-memory one for tests).
use crate::error::Result;
use crate::types::{ConversationSummary, Message, Profile};
use async_trait::async_trait;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Conversation list for a user, most recently active first
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>>;

    /// Full message history between two users, ascending by time
    async fn list_messages(&self, user_id: &str, peer_id: &str) -> Result<Vec<Message>>;

    /// Public profile lookup
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Persist a new message. Content is expected to be pre-trimmed;
    /// backends reject empty content with `ValidationFailed`.
    async fn create_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<Message>;
}
