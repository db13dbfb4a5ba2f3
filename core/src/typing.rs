/// Typing presence state machine for the active conversation
///
/// Two independent sub-protocols share the conversation topic:
/// local emission (keystroke-driven, debounced) and remote consumption
/// (auto-expiring). Deadlines are plain fields; the session loop turns them
/// into timers. Setting a deadline always replaces the previous one.
///
/// The expiry window must exceed the idle window: a lost typing:false must
/// self-heal on the consumer side, and a delivered one must win the race
/// against expiry under normal network delay.
use std::time::Duration;
use tokio::time::Instant;

pub struct TypingPresence {
    idle: Duration,
    expiry: Duration,

    /// We have announced typing:true and not yet retracted it
    local_typing: bool,
    /// When the local idle timer fires, if no further keystroke arrives
    idle_deadline: Option<Instant>,

    /// The peer is visibly typing
    remote_typing: bool,
    /// When the remote indicator auto-expires without a follow-up signal
    expiry_deadline: Option<Instant>,
}

impl TypingPresence {
    pub fn new(idle: Duration, expiry: Duration) -> Self {
        Self {
            idle,
            expiry,
            local_typing: false,
            idle_deadline: None,
            remote_typing: false,
            expiry_deadline: None,
        }
    }

    pub fn remote_typing(&self) -> bool {
        self.remote_typing
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    pub fn expiry_deadline(&self) -> Option<Instant> {
        self.expiry_deadline
    }

    /// Keystroke handling. Non-empty content emits typing:true and restarts
    /// the idle timer; content becoming empty retracts immediately.
    /// Returns the signal to publish, if any.
    pub fn on_draft_change(&mut self, now: Instant, empty: bool) -> Option<bool> {
        if empty {
            self.idle_deadline = None;
            if self.local_typing {
                self.local_typing = false;
                return Some(false);
            }
            return None;
        }
        self.local_typing = true;
        self.idle_deadline = Some(now + self.idle);
        Some(true)
    }

    /// The idle timer fired with no further keystrokes.
    pub fn on_idle_elapsed(&mut self) -> Option<bool> {
        self.idle_deadline = None;
        if self.local_typing {
            self.local_typing = false;
            return Some(false);
        }
        None
    }

    /// Explicit send: retract immediately and cancel the pending idle timer
    /// so a stale typing:false cannot fire after the draft is cleared.
    pub fn on_send(&mut self) -> Option<bool> {
        self.idle_deadline = None;
        self.local_typing = false;
        Some(false)
    }

    /// Remote signal from the peer. typing:true (re)arms the expiry timer;
    /// typing:false clears both. Returns the new remote state.
    pub fn on_remote_signal(&mut self, now: Instant, typing: bool) -> bool {
        if typing {
            self.remote_typing = true;
            self.expiry_deadline = Some(now + self.expiry);
        } else {
            self.remote_typing = false;
            self.expiry_deadline = None;
        }
        self.remote_typing
    }

    /// The expiry timer fired: the terminal typing:false was lost, heal.
    pub fn on_expiry_elapsed(&mut self) -> bool {
        self.expiry_deadline = None;
        self.remote_typing = false;
        false
    }

    /// Drop all state, e.g. when the active peer changes.
    pub fn reset(&mut self) {
        self.local_typing = false;
        self.idle_deadline = None;
        self.remote_typing = false;
        self.expiry_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence() -> TypingPresence {
        TypingPresence::new(Duration::from_secs(2), Duration::from_secs(3))
    }

    #[test]
    fn test_keystrokes_restart_idle_timer() {
        let mut p = presence();
        let t0 = Instant::now();

        assert_eq!(p.on_draft_change(t0, false), Some(true));
        assert_eq!(p.idle_deadline(), Some(t0 + Duration::from_secs(2)));

        // Second keystroke at t=1s supersedes the first deadline; the
        // retraction may only fire at t=3s, never at t=2s.
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(p.on_draft_change(t1, false), Some(true));
        assert_eq!(p.idle_deadline(), Some(t1 + Duration::from_secs(2)));

        assert_eq!(p.on_idle_elapsed(), Some(false));
        assert_eq!(p.idle_deadline(), None);
    }

    #[test]
    fn test_idle_elapsed_without_prior_typing_emits_nothing() {
        let mut p = presence();
        assert_eq!(p.on_idle_elapsed(), None);
    }

    #[test]
    fn test_draft_becoming_empty_retracts_once() {
        let mut p = presence();
        let t0 = Instant::now();

        p.on_draft_change(t0, false);
        assert_eq!(p.on_draft_change(t0, true), Some(false));
        assert_eq!(p.idle_deadline(), None);

        // Already retracted: no duplicate signal
        assert_eq!(p.on_draft_change(t0, true), None);
    }

    #[test]
    fn test_send_retracts_and_cancels_idle_timer() {
        let mut p = presence();
        let t0 = Instant::now();

        p.on_draft_change(t0, false);
        assert_eq!(p.on_send(), Some(false));
        assert_eq!(p.idle_deadline(), None);
        assert_eq!(p.on_idle_elapsed(), None);
    }

    #[test]
    fn test_remote_true_arms_expiry() {
        let mut p = presence();
        let t0 = Instant::now();

        assert!(p.on_remote_signal(t0, true));
        assert_eq!(p.expiry_deadline(), Some(t0 + Duration::from_secs(3)));

        // Re-announcement replaces the deadline, never stacks a second one
        let t1 = t0 + Duration::from_secs(1);
        assert!(p.on_remote_signal(t1, true));
        assert_eq!(p.expiry_deadline(), Some(t1 + Duration::from_secs(3)));
    }

    #[test]
    fn test_remote_false_clears_immediately() {
        let mut p = presence();
        let t0 = Instant::now();

        p.on_remote_signal(t0, true);
        assert!(!p.on_remote_signal(t0, false));
        assert_eq!(p.expiry_deadline(), None);
    }

    #[test]
    fn test_expiry_self_heals_lost_terminal_signal() {
        let mut p = presence();
        let t0 = Instant::now();

        p.on_remote_signal(t0, true);
        assert!(!p.on_expiry_elapsed());
        assert!(!p.remote_typing());
        assert_eq!(p.expiry_deadline(), None);
    }

    #[test]
    fn test_reset_drops_everything() {
        let mut p = presence();
        let t0 = Instant::now();

        p.on_draft_change(t0, false);
        p.on_remote_signal(t0, true);
        p.reset();

        assert!(!p.remote_typing());
        assert_eq!(p.idle_deadline(), None);
        assert_eq!(p.expiry_deadline(), None);
    }
}
