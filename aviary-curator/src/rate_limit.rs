//! Fixed-window rate limiter
//!
//! Each identifier gets a counter and a window end. The first request after the
//! window ends opens a new window. This is a fixed window, not a sliding one: a
//! client can land up to `2 * max_requests` requests in a short span straddling
//! a window boundary (the tail of one window plus the head of the next). That
//! approximation is accepted.
//!
//! Records live in a process-local [`RateLimitStore`]; limits are not shared
//! between instances of the service.

use aviary_common::config::RateLimitConfig;
use aviary_common::time::saturating_add;
use aviary_common::{Clock, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::sweeper::Sweep;

/// Request count of the live window for one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// Outcome of a rate-limit check; a rejection is a value, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Storage of rate-limit records
pub trait RateLimitStore: Send + Sync {
    /// Run `update` on the record for `key` while holding it exclusively
    ///
    /// `update` may replace, modify or clear the record.
    fn update(&self, key: &str, update: &mut dyn FnMut(&mut Option<RateLimitRecord>));

    /// Remove records whose window ended before `now`; returns the number removed
    fn remove_expired(&self, now: DateTime<Utc>) -> usize;

    fn len(&self) -> usize;
}

/// [`RateLimitStore`] over a mutex-guarded `HashMap`
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn update(&self, key: &str, update: &mut dyn FnMut(&mut Option<RateLimitRecord>)) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut slot = records.get(key).copied();
        update(&mut slot);
        match slot {
            Some(record) => {
                records.insert(key.to_string(), record);
            }
            None => {
                records.remove(key);
            }
        }
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, record| now <= record.reset_at);
        before - records.len()
    }

    fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Fixed-window limiter over a [`RateLimitStore`]
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Limiter over a fresh [`InMemoryRateLimitStore`]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), clock)
    }

    /// Count one request for `identifier` and decide whether it may proceed
    ///
    /// A `max_requests` of zero rejects everything.
    pub fn check_rate_limit(&self, identifier: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = self.clock.now();
        let mut decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: now,
        };

        self.store.update(identifier, &mut |slot: &mut Option<RateLimitRecord>| {
            match slot {
                Some(record) if now <= record.reset_at => {
                    decision.reset_at = record.reset_at;
                    if record.count >= config.max_requests {
                        decision.allowed = false;
                        decision.remaining = 0;
                    } else {
                        record.count += 1;
                        decision.allowed = true;
                        decision.remaining = config.max_requests - record.count;
                    }
                }
                _ => {
                    // No live window: open a new one
                    let reset_at = saturating_add(now, config.window());
                    decision.reset_at = reset_at;
                    if config.max_requests == 0 {
                        *slot = Some(RateLimitRecord { count: 0, reset_at });
                        decision.allowed = false;
                        decision.remaining = 0;
                    } else {
                        *slot = Some(RateLimitRecord { count: 1, reset_at });
                        decision.allowed = true;
                        decision.remaining = config.max_requests - 1;
                    }
                }
            }
        });

        if !decision.allowed {
            debug!(identifier = %identifier, reset_at = %decision.reset_at, "Rate limit exceeded");
        }

        decision
    }

    /// Time until the window of `decision` ends; zero once it has
    pub fn retry_after(&self, decision: &RateLimitDecision) -> std::time::Duration {
        (decision.reset_at - self.clock.now())
            .to_std()
            .unwrap_or_default()
    }

    /// Drop records whose window has ended; returns the number removed
    pub fn purge_expired(&self) -> usize {
        self.store.remove_expired(self.clock.now())
    }

    /// Number of identifiers currently tracked
    pub fn tracked(&self) -> usize {
        self.store.len()
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn sweep(&self) -> Result<usize> {
        Ok(self.purge_expired())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aviary_common::ManualClock;
    use chrono::{Duration, TimeZone};

    const THREE_PER_SECOND: RateLimitConfig = RateLimitConfig::new(3, 1000);

    fn setup() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let limiter = RateLimiter::in_memory(clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_window_allows_max_then_rejects() {
        let (clock, limiter) = setup();
        let start = clock.now();

        let remaining: Vec<u32> = (0..3)
            .map(|_| {
                let decision = limiter.check_rate_limit("client", &THREE_PER_SECOND);
                assert!(decision.allowed);
                assert_eq!(decision.reset_at, start + Duration::milliseconds(1000));
                decision.remaining
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let fourth = limiter.check_rate_limit("client", &THREE_PER_SECOND);
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.reset_at, start + Duration::milliseconds(1000));
    }

    #[test]
    fn test_new_window_after_reset() {
        let (clock, limiter) = setup();
        for _ in 0..4 {
            limiter.check_rate_limit("client", &THREE_PER_SECOND);
        }

        // Still rejected exactly at the reset instant
        clock.advance(Duration::milliseconds(1000));
        assert!(!limiter.check_rate_limit("client", &THREE_PER_SECOND).allowed);

        clock.advance(Duration::milliseconds(1));
        let decision = limiter.check_rate_limit("client", &THREE_PER_SECOND);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, clock.now() + Duration::milliseconds(1000));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let (_clock, limiter) = setup();
        for _ in 0..3 {
            limiter.check_rate_limit("a", &THREE_PER_SECOND);
        }
        assert!(!limiter.check_rate_limit("a", &THREE_PER_SECOND).allowed);
        assert!(limiter.check_rate_limit("b", &THREE_PER_SECOND).allowed);
    }

    #[test]
    fn test_boundary_burst_is_accepted() {
        // Fixed windows let 2x the limit through around a boundary
        let (clock, limiter) = setup();
        clock.advance(Duration::milliseconds(1));
        for _ in 0..3 {
            assert!(limiter.check_rate_limit("c", &THREE_PER_SECOND).allowed);
        }
        // Just past the reset instant: a fresh window opens
        clock.advance(Duration::milliseconds(1001));
        for _ in 0..3 {
            assert!(limiter.check_rate_limit("c", &THREE_PER_SECOND).allowed);
        }
        assert!(!limiter.check_rate_limit("c", &THREE_PER_SECOND).allowed);
    }

    #[test]
    fn test_zero_max_requests_rejects() {
        let (_clock, limiter) = setup();
        let decision = limiter.check_rate_limit("z", &RateLimitConfig::new(0, 1000));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_purge_expired_keeps_live_windows() {
        let (clock, limiter) = setup();
        limiter.check_rate_limit("short", &RateLimitConfig::new(5, 1000));
        limiter.check_rate_limit("long", &RateLimitConfig::new(5, 60_000));
        assert_eq!(limiter.tracked(), 2);

        clock.advance(Duration::seconds(2));
        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_purge_does_not_change_decisions() {
        let (clock, limiter) = setup();
        for _ in 0..3 {
            limiter.check_rate_limit("client", &THREE_PER_SECOND);
        }
        clock.advance(Duration::seconds(2));

        // Lazy expiry and sweep agree: a fresh window either way
        let lazily = limiter.check_rate_limit("client", &THREE_PER_SECOND);
        limiter.purge_expired();
        assert!(lazily.allowed);
        assert_eq!(lazily.remaining, 2);
    }

    #[test]
    fn test_retry_after_counts_down_to_zero() {
        let (clock, limiter) = setup();
        let decision = limiter.check_rate_limit("client", &THREE_PER_SECOND);
        assert_eq!(
            limiter.retry_after(&decision),
            std::time::Duration::from_millis(1000)
        );

        clock.advance(Duration::milliseconds(400));
        assert_eq!(
            limiter.retry_after(&decision),
            std::time::Duration::from_millis(600)
        );

        clock.advance(Duration::seconds(5));
        assert_eq!(limiter.retry_after(&decision), std::time::Duration::ZERO);
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let (_clock, limiter) = setup();
        let decision = limiter.check_rate_limit("client", &THREE_PER_SECOND);
        let json = serde_json::to_value(decision).unwrap();
        assert_eq!(json["allowed"], true);
        assert_eq!(json["remaining"], 2);
        assert!(json["resetAt"].is_string());
    }
}
