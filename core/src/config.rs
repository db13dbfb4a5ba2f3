/// Configuration management
use std::time::Duration;

const DEFAULT_TYPING_IDLE_MS: u64 = 2_000;
const DEFAULT_TYPING_EXPIRY_MS: u64 = 3_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Quiet period after the last keystroke before a local typing:false is sent
    pub typing_idle: Duration,

    /// How long a remote typing:true stays visible without a follow-up signal.
    /// Must exceed `typing_idle` so normal network delay does not cause flicker.
    pub typing_expiry: Duration,

    /// Store refresh cadence while the realtime subscription is lost
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_idle: Duration::from_millis(DEFAULT_TYPING_IDLE_MS),
            typing_expiry: Duration::from_millis(DEFAULT_TYPING_EXPIRY_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl SessionConfig {
    /// Create config with env overrides applied (nice for scripts)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_ms("CHATLINK_TYPING_IDLE_MS") {
            config.typing_idle = ms;
        }
        if let Some(ms) = env_ms("CHATLINK_TYPING_EXPIRY_MS") {
            config.typing_expiry = ms;
        }
        if let Some(ms) = env_ms("CHATLINK_POLL_INTERVAL_MS") {
            config.poll_interval = ms;
        }
        config.normalized()
    }

    /// Clamp the expiry above the idle window; the remote side must not
    /// flicker before our own idle timer has had a chance to fire.
    pub fn normalized(mut self) -> Self {
        let floor = self.typing_idle + Duration::from_millis(500);
        if self.typing_expiry < floor {
            self.typing_expiry = floor;
        }
        self
    }
}

fn env_ms(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_expiry_above_idle() {
        let config = SessionConfig::default();
        assert!(config.typing_expiry > config.typing_idle);
    }

    #[test]
    fn test_normalized_clamps_expiry() {
        let config = SessionConfig {
            typing_idle: Duration::from_secs(2),
            typing_expiry: Duration::from_secs(1),
            ..Default::default()
        }
        .normalized();
        assert!(config.typing_expiry > config.typing_idle);
    }
}
