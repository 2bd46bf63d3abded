//! # Typing Rate Limiter
//!
//! Throttles typing indicators to one event per second per target.
//! Excess events are silently dropped - no error frame, no persistence.
//!
//! Each connection owns its limiter (the reader task is the only caller,
//! so no locking): a user typing from two devices may emit one event per
//! second per socket, which downstream clients render identically.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// The party a typing indicator addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypingTarget {
    User(Uuid),
    Group(Uuid),
}

/// Per-connection throttle: at most one typing event per interval per
/// target.
pub struct TypingRateLimiter {
    min_interval: Duration,
    last_sent: HashMap<TypingTarget, Instant>,
}

impl TypingRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: HashMap::new(),
        }
    }

    /// One-per-second default from the protocol contract.
    pub fn with_default_interval() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Returns `true` if an event for `target` may be forwarded now, and
    /// records the send. `false` means drop silently.
    pub fn allow(&mut self, target: TypingTarget) -> bool {
        self.allow_at(target, Instant::now())
    }

    fn allow_at(&mut self, target: TypingTarget, now: Instant) -> bool {
        match self.last_sent.get(&target) {
            Some(last) if now.duration_since(*last) < self.min_interval => false,
            _ => {
                self.last_sent.insert(target, now);
                true
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_event_allowed() {
        let mut limiter = TypingRateLimiter::with_default_interval();
        assert!(limiter.allow(TypingTarget::User(Uuid::new_v4())));
    }

    #[test]
    fn test_burst_within_interval_dropped() {
        let mut limiter = TypingRateLimiter::new(Duration::from_secs(1));
        let target = TypingTarget::User(Uuid::new_v4());
        let t0 = Instant::now();

        assert!(limiter.allow_at(target, t0));
        assert!(!limiter.allow_at(target, t0 + Duration::from_millis(100)));
        assert!(!limiter.allow_at(target, t0 + Duration::from_millis(999)));
        assert!(limiter.allow_at(target, t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn test_targets_are_independent() {
        let mut limiter = TypingRateLimiter::new(Duration::from_secs(1));
        let alice = TypingTarget::User(Uuid::new_v4());
        let group = TypingTarget::Group(Uuid::new_v4());
        let t0 = Instant::now();

        assert!(limiter.allow_at(alice, t0));
        // Different target is unaffected by alice's event
        assert!(limiter.allow_at(group, t0));
        assert!(!limiter.allow_at(alice, t0 + Duration::from_millis(500)));
        assert!(!limiter.allow_at(group, t0 + Duration::from_millis(500)));
    }

    #[test]
    fn test_user_and_group_with_same_id_are_distinct() {
        let mut limiter = TypingRateLimiter::new(Duration::from_secs(1));
        let id = Uuid::new_v4();
        let t0 = Instant::now();

        assert!(limiter.allow_at(TypingTarget::User(id), t0));
        assert!(limiter.allow_at(TypingTarget::Group(id), t0));
    }
}
