/// ChatLink - Real-Time Conversation Sync Core
///
/// The synchronization engine behind a direct-messaging client: session-keyed
/// conversation topics, event-driven cache invalidation over an injected
/// realtime transport, and debounced typing presence.

pub mod backend;
pub mod composer;
pub mod config;
pub mod error;
pub mod invalidator;
pub mod realtime;
pub mod session;
pub mod store;
pub mod testing;
pub mod topic;
pub mod types;
pub mod typing;

pub use backend::ChatBackend;
pub use config::SessionConfig;
pub use error::{ChatError, Result};
pub use realtime::{RealtimeEvent, RealtimeTransport, SubscriptionHandle};
pub use session::{ChatSession, SessionHandle};
pub use topic::derive_topic;
pub use types::{
    BroadcastPayload, ChangeEvent, ChangeOp, ConversationSummary, Message, PresenceView, Profile,
};
