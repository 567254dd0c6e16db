use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub const MAX_ATTEMPTS: u32 = 5;
pub const LOCKOUT_MINUTES: i64 = 15;

/// Outcome of a lockout check before a login attempt is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Open,
    Locked { until: DateTime<Utc> },
}

/// Transient abuse throttle keyed by `username_ip`. Swappable so
/// multi-instance deployments can plug in a shared store; state is not
/// persisted and resets with the process.
pub trait AttemptStore: Send + Sync {
    fn check(&self, identifier: &str, now: DateTime<Utc>) -> LockState;

    /// Record a failure and return how many attempts remain before lockout.
    fn record_failure(&self, identifier: &str, now: DateTime<Utc>) -> u32;

    fn clear(&self, identifier: &str);
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    count: u32,
    locked_until: Option<DateTime<Utc>>,
}

/// In-memory implementation for single-instance deployments.
#[derive(Default)]
pub struct MemoryAttemptStore {
    inner: Mutex<HashMap<String, Attempt>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptStore for MemoryAttemptStore {
    fn check(&self, identifier: &str, now: DateTime<Utc>) -> LockState {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(identifier).copied() {
            Some(Attempt {
                locked_until: Some(until),
                ..
            }) if until > now => LockState::Locked { until },
            Some(Attempt {
                locked_until: Some(_),
                ..
            }) => {
                // Lock window elapsed, start over.
                map.remove(identifier);
                LockState::Open
            }
            _ => LockState::Open,
        }
    }

    fn record_failure(&self, identifier: &str, now: DateTime<Utc>) -> u32 {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let attempt = map.entry(identifier.to_string()).or_insert(Attempt {
            count: 0,
            locked_until: None,
        });
        attempt.count += 1;
        if attempt.count >= MAX_ATTEMPTS {
            attempt.locked_until = Some(now + Duration::minutes(LOCKOUT_MINUTES));
        }
        MAX_ATTEMPTS.saturating_sub(attempt.count)
    }

    fn clear(&self, identifier: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(identifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_after_five_failures() {
        let store = MemoryAttemptStore::new();
        let now = Utc::now();

        for expected_remaining in [4, 3, 2, 1] {
            let remaining = store.record_failure("budi_10.0.0.1", now);
            assert_eq!(remaining, expected_remaining);
            assert_eq!(store.check("budi_10.0.0.1", now), LockState::Open);
        }

        assert_eq!(store.record_failure("budi_10.0.0.1", now), 0);
        match store.check("budi_10.0.0.1", now) {
            LockState::Locked { until } => {
                let window = until - now;
                assert_eq!(window.num_minutes(), LOCKOUT_MINUTES);
            }
            LockState::Open => panic!("expected lockout after {MAX_ATTEMPTS} failures"),
        }
    }

    #[test]
    fn success_clears_counter() {
        let store = MemoryAttemptStore::new();
        let now = Utc::now();
        for _ in 0..4 {
            store.record_failure("siti_10.0.0.2", now);
        }
        store.clear("siti_10.0.0.2");
        assert_eq!(store.record_failure("siti_10.0.0.2", now), 4);
    }

    #[test]
    fn lock_expires_after_window() {
        let store = MemoryAttemptStore::new();
        let now = Utc::now();
        for _ in 0..5 {
            store.record_failure("joko_10.0.0.3", now);
        }
        let later = now + Duration::minutes(LOCKOUT_MINUTES + 1);
        assert_eq!(store.check("joko_10.0.0.3", later), LockState::Open);
    }

    #[test]
    fn identifiers_are_independent() {
        let store = MemoryAttemptStore::new();
        let now = Utc::now();
        for _ in 0..5 {
            store.record_failure("budi_10.0.0.1", now);
        }
        assert_eq!(store.check("budi_10.0.0.9", now), LockState::Open);
    }
}
