/// Message sending
use crate::backend::ChatBackend;
use crate::error::Result;
use crate::types::Message;
use std::sync::Arc;
use tracing::debug;

pub struct MessageComposer {
    user_id: String,
    backend: Arc<dyn ChatBackend>,
}

impl MessageComposer {
    pub fn new(user_id: String, backend: Arc<dyn ChatBackend>) -> Self {
        Self { user_id, backend }
    }

    /// Send trimmed content to `peer_id`. Whitespace-only content is a
    /// no-op, not an error: the guard belongs at this level, before any
    /// request is issued. Returns the stored message on success.
    pub async fn send(&self, peer_id: &str, content: &str) -> Result<Option<Message>> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            debug!("empty draft, nothing to send");
            return Ok(None);
        }
        let message = self
            .backend
            .create_message(&self.user_id, peer_id, trimmed)
            .await?;
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;

    #[tokio::test]
    async fn test_content_is_trimmed_before_storage() {
        let backend = Arc::new(MemoryBackend::new());
        let composer = MessageComposer::new("u1".to_string(), backend.clone());

        let message = composer.send("u2", "  hello  ").await.unwrap().unwrap();
        assert_eq!(message.content, "hello");
        assert_eq!(message.sender_id, "u1");
        assert_eq!(message.receiver_id, "u2");
    }

    #[tokio::test]
    async fn test_whitespace_only_content_issues_no_request() {
        let backend = Arc::new(MemoryBackend::new());
        let composer = MessageComposer::new("u1".to_string(), backend.clone());

        assert!(composer.send("u2", "").await.unwrap().is_none());
        assert!(composer.send("u2", "   ").await.unwrap().is_none());
        assert_eq!(backend.create_message_calls(), 0);
    }
}
