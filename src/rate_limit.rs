//! Request rate limiting
//!
//! Per-user hourly and daily windows with lazy resets: counters are only
//! interpreted after checking whether their reset time has passed, no
//! background sweeper. Whitelisted users are always allowed and never
//! recorded.
//!
//! `is_allowed` and `record_access` are deliberately independent calls; each
//! is internally consistent under the record mutex, and the check-then-act
//! window between them is accepted for abuse prevention.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BotError;

/// Wall clock seam so window math is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Limiter configuration.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub hourly_limit: u32,
    pub daily_limit: u32,
    /// User ids exempt from limiting.
    pub whitelist: Vec<i64>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            hourly_limit: 10,
            daily_limit: 50,
            whitelist: Vec::new(),
        }
    }
}

/// Per-user window counters.
#[derive(Debug, Clone)]
struct UserWindows {
    hourly_count: u32,
    hourly_reset: DateTime<Utc>,
    daily_count: u32,
    daily_reset: DateTime<Utc>,
}

impl UserWindows {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            hourly_count: 1,
            hourly_reset: now + Duration::hours(1),
            daily_count: 1,
            daily_reset: now + Duration::hours(24),
        }
    }
}

/// Per-user request limiter over lazily-reset windows.
pub struct RequestLimiter {
    config: LimiterConfig,
    records: Mutex<HashMap<i64, UserWindows>>,
    clock: Arc<dyn Clock>,
}

impl RequestLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Whether a request from `user_id` may proceed right now. The daily cap
    /// is reported before the hourly one so the user sees the stricter
    /// condition.
    pub fn is_allowed(&self, user_id: i64) -> Result<(), BotError> {
        if self.is_whitelisted(user_id) {
            return Ok(());
        }

        let records = self.records.lock();
        let Some(record) = records.get(&user_id) else {
            return Ok(());
        };

        let now = self.clock.now();
        if now > record.daily_reset {
            // Both windows are stale; counts no longer apply.
            return Ok(());
        }
        if now > record.hourly_reset && record.daily_count < self.config.daily_limit {
            return Ok(());
        }
        if record.daily_count >= self.config.daily_limit {
            return Err(BotError::DailyLimitExceeded);
        }
        if record.hourly_count >= self.config.hourly_limit {
            return Err(BotError::HourlyLimitExceeded);
        }
        Ok(())
    }

    /// Records one granted request. No-op for whitelisted users.
    pub fn record_access(&self, user_id: i64) {
        if self.is_whitelisted(user_id) {
            return;
        }

        let now = self.clock.now();
        let mut records = self.records.lock();
        match records.get_mut(&user_id) {
            None => {
                records.insert(user_id, UserWindows::fresh(now));
            }
            Some(record) => {
                if now > record.daily_reset {
                    *record = UserWindows::fresh(now);
                } else if now > record.hourly_reset {
                    record.hourly_count = 1;
                    record.hourly_reset = now + Duration::hours(1);
                    record.daily_count += 1;
                } else {
                    record.hourly_count += 1;
                    record.daily_count += 1;
                }
            }
        }
    }

    fn is_whitelisted(&self, user_id: i64) -> bool {
        self.config.whitelist.contains(&user_id)
    }

    #[cfg(test)]
    fn counts(&self, user_id: i64) -> Option<(u32, u32)> {
        self.records
            .lock()
            .get(&user_id)
            .map(|r| (r.hourly_count, r.daily_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self { now: Mutex::new(now) })
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }

    fn test_limiter(whitelist: Vec<i64>) -> (RequestLimiter, Arc<ManualClock>) {
        let clock = ManualClock::starting_at(Utc::now());
        let config = LimiterConfig {
            hourly_limit: 5,
            daily_limit: 15,
            whitelist,
        };
        (RequestLimiter::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_hourly_limit_then_lazy_reset() {
        let (limiter, clock) = test_limiter(Vec::new());
        let user = 100;

        for _ in 0..5 {
            limiter.is_allowed(user).unwrap();
            limiter.record_access(user);
        }

        assert!(matches!(
            limiter.is_allowed(user),
            Err(BotError::HourlyLimitExceeded)
        ));

        // Once the hourly window lapses the same user is admitted again.
        clock.advance(Duration::minutes(61));
        limiter.is_allowed(user).unwrap();

        limiter.record_access(user);
        // Hourly counter restarted, daily kept accumulating.
        assert_eq!(limiter.counts(user), Some((1, 6)));
    }

    #[test]
    fn test_daily_limit_reported_over_hourly() {
        let (limiter, clock) = test_limiter(Vec::new());
        let user = 101;

        // Burn the daily budget across four hours.
        for _ in 0..3 {
            for _ in 0..5 {
                limiter.is_allowed(user).unwrap();
                limiter.record_access(user);
            }
            clock.advance(Duration::minutes(61));
        }

        assert_eq!(limiter.counts(user), Some((5, 15)));
        assert!(matches!(
            limiter.is_allowed(user),
            Err(BotError::DailyLimitExceeded)
        ));

        // Another lapsed hourly window does not help once the day is spent.
        clock.advance(Duration::minutes(61));
        assert!(matches!(
            limiter.is_allowed(user),
            Err(BotError::DailyLimitExceeded)
        ));
    }

    #[test]
    fn test_daily_reset_reinitializes_both_windows() {
        let (limiter, clock) = test_limiter(Vec::new());
        let user = 102;

        for _ in 0..5 {
            limiter.record_access(user);
        }
        clock.advance(Duration::hours(25));

        limiter.is_allowed(user).unwrap();
        limiter.record_access(user);
        assert_eq!(limiter.counts(user), Some((1, 1)));
    }

    #[test]
    fn test_whitelisted_user_never_limited_never_recorded() {
        let (limiter, _clock) = test_limiter(vec![7]);

        for _ in 0..100 {
            limiter.is_allowed(7).unwrap();
            limiter.record_access(7);
        }
        assert_eq!(limiter.counts(7), None);
    }

    #[test]
    fn test_fresh_user_allowed() {
        let (limiter, _clock) = test_limiter(Vec::new());
        limiter.is_allowed(999).unwrap();
    }

    #[test]
    fn test_users_are_independent() {
        let (limiter, _clock) = test_limiter(Vec::new());

        for _ in 0..5 {
            limiter.record_access(1);
        }
        assert!(limiter.is_allowed(1).is_err());
        limiter.is_allowed(2).unwrap();
    }
}
