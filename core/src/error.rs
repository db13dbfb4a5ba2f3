/// Error types for the messaging core
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ChatError {
    /// Transient backend failure: retryable, cached state stays usable
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Session credentials rejected: fatal for the session
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// User-correctable input problem (e.g. empty message content)
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Realtime stream dropped: non-fatal, degrade to polling
    #[error("subscription lost: {0}")]
    SubscriptionLost(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Session event loop has stopped; no further commands are accepted
    #[error("session closed")]
    SessionClosed,
}

impl ChatError {
    /// Whether the presentation layer should offer a retry affordance
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::BackendUnavailable(_) | ChatError::SubscriptionLost(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
