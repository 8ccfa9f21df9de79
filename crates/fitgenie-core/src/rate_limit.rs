//! Fixed-window admission control per caller identity.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_REQUESTS: u32 = 60;

/// Entries are swept once the map grows past this many identities.
const SWEEP_THRESHOLD: usize = 10_000;

/// Who is being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateKey {
    User(Uuid),
    Ip(IpAddr),
}

impl RateKey {
    /// The authenticated user when known, else the network address.
    pub fn for_caller(user_id: Option<Uuid>, addr: IpAddr) -> Self {
        user_id.map_or(Self::Ip(addr), Self::User)
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Ip(ip) => write!(f, "ip:{ip}"),
        }
    }
}

/// Result of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub admitted: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the current window ends.
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    /// Whole seconds until the window resets, as seen from `now`.
    pub fn reset_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        u64::try_from(millis).unwrap_or(0).div_ceil(1000)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit of {limit} requests exceeded for {key}; retry after {reset_at}")]
    Exceeded {
        key: RateKey,
        limit: u32,
        reset_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Counts requests per [`RateKey`] in fixed windows.
#[derive(Debug)]
pub struct RateLimiter {
    window: TimeDelta,
    max_requests: u32,
    windows: Mutex<HashMap<RateKey, RateWindow>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// End of a window opened at `started_at`. Windows too long to
    /// represent never end.
    fn window_end(&self, started_at: DateTime<Utc>) -> DateTime<Utc> {
        started_at
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Record a request for `key` and report whether it is admitted.
    pub fn admit(&self, key: RateKey) -> bool {
        self.check(key).admitted
    }

    /// Like [`Self::admit`], with the full decision.
    pub fn check(&self, key: RateKey) -> RateDecision {
        self.check_at(key, Utc::now())
    }

    /// Like [`Self::check`], as an error when rejected.
    pub fn enforce(&self, key: RateKey) -> Result<RateDecision, RateLimitError> {
        let decision = self.check(key);
        if decision.admitted {
            Ok(decision)
        } else {
            Err(RateLimitError::Exceeded {
                key,
                limit: decision.limit,
                reset_at: decision.reset_at,
            })
        }
    }

    /// Admission check against an explicit clock reading.
    pub fn check_at(&self, key: RateKey, now: DateTime<Utc>) -> RateDecision {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, w| now < self.window_end(w.started_at));
        }

        let entry = windows.entry(key).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });
        if now >= self.window_end(entry.started_at) {
            *entry = RateWindow {
                started_at: now,
                count: 0,
            };
        }

        let admitted = entry.count < self.max_requests;
        if admitted {
            entry.count += 1;
        }

        let decision = RateDecision {
            admitted,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_at: self.window_end(entry.started_at),
        };
        if !admitted {
            tracing::warn!(key = %key, limit = self.max_requests, "rate limit exceeded");
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn user() -> RateKey {
        RateKey::User(Uuid::new_v4())
    }

    #[test]
    fn sixty_first_request_is_rejected() {
        let limiter = RateLimiter::default();
        let key = user();
        let now = Utc::now();

        for i in 0..60 {
            let decision = limiter.check_at(key, now);
            assert!(decision.admitted, "request {} should be admitted", i + 1);
            assert_eq!(decision.remaining, 59 - i);
        }

        let decision = limiter.check_at(key, now);
        assert!(!decision.admitted);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.limit, 60);
        assert_eq!(decision.reset_at, now + TimeDelta::hours(1));
    }

    #[test]
    fn window_reset_admits_again() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        let key = user();
        let start = Utc::now();

        assert!(limiter.check_at(key, start).admitted);
        assert!(limiter.check_at(key, start + TimeDelta::seconds(10)).admitted);
        assert!(!limiter.check_at(key, start + TimeDelta::seconds(59)).admitted);

        let after = limiter.check_at(key, start + TimeDelta::seconds(60));
        assert!(after.admitted);
        assert_eq!(after.remaining, 1);
        assert_eq!(after.reset_at, start + TimeDelta::seconds(120));
    }

    #[test]
    fn identities_are_counted_separately() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let a = user();
        let b = RateKey::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST));

        assert!(limiter.admit(a));
        assert!(!limiter.admit(a));
        assert!(limiter.admit(b));
        assert!(!limiter.admit(b));
    }

    #[test]
    fn enforce_reports_exceeded() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let key = user();
        assert!(limiter.enforce(key).is_ok());
        let err = limiter.enforce(key).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { limit: 1, .. }));
    }

    #[test]
    fn oversized_window_never_resets() {
        let limiter = RateLimiter::new(Duration::from_secs(u64::MAX), 1);
        let key = user();
        let now = Utc::now();

        let first = limiter.check_at(key, now);
        assert!(first.admitted);
        assert_eq!(first.reset_at, DateTime::<Utc>::MAX_UTC);
        assert!(!limiter.check_at(key, now + TimeDelta::days(365 * 100)).admitted);
        assert!(first.reset_after_secs(now) > 0);
    }

    #[test]
    fn caller_key_prefers_user() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let id = Uuid::new_v4();
        assert_eq!(RateKey::for_caller(Some(id), ip), RateKey::User(id));
        assert_eq!(RateKey::for_caller(None, ip), RateKey::Ip(ip));
        assert_eq!(RateKey::Ip(ip).to_string(), "ip:10.0.0.1");
    }

    #[test]
    fn reset_after_rounds_up() {
        let now = Utc::now();
        let decision = RateDecision {
            admitted: true,
            limit: 1,
            remaining: 0,
            reset_at: now + TimeDelta::milliseconds(1500),
        };
        assert_eq!(decision.reset_after_secs(now), 2);
        assert_eq!(decision.reset_after_secs(now + TimeDelta::seconds(5)), 0);
    }

    #[test]
    fn concurrent_checks_never_over_admit() {
        let limiter = std::sync::Arc::new(RateLimiter::new(Duration::from_secs(3600), 50));
        let key = user();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.admit(key)).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
