/// Realtime delivery: transport boundary and per-conversation subscription
pub mod subscription;
pub mod transport;

pub use subscription::{RealtimeSubscription, SubscriptionState};
pub use transport::{RealtimeEvent, RealtimeTransport, SubscriptionHandle, SubscriptionKind};
