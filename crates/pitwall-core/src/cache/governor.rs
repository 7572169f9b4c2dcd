//! Refresh decisions for cached resources.
//!
//! The governor only reads: it looks at what the [`CacheStore`] knows about a
//! key and answers whether a remote fetch is worth spending right now.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use super::metadata::KeyMetadata;
use super::CacheStore;

const HOUR: u64 = 60 * 60;

/// Interval while an event is imminent or just finished (results firming up).
pub const EVENT_WINDOW_INTERVAL: Duration = Duration::from_secs(6 * HOUR);

/// Interval during the week after an event.
pub const POST_EVENT_INTERVAL: Duration = Duration::from_secs(24 * HOUR);

/// Interval when nothing is happening.
pub const QUIET_INTERVAL: Duration = Duration::from_secs(7 * 24 * HOUR);

/// Whole calendar days from `today` to `event_date`. Negative once it has passed.
pub fn days_until(today: NaiveDate, event_date: NaiveDate) -> i64 {
    (event_date - today).num_days()
}

/// Parse an API date (`YYYY-MM-DD`).
pub fn parse_event_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

/// Minimum refresh interval given how close `event_date` is to `today`.
///
/// | days until event | interval |
/// |------------------|----------|
/// | -1 ..= 3         | 6 hours  |
/// | -7 ..= -2        | 24 hours |
/// | anything else    | 7 days   |
///
/// A missing or unparseable date yields `default`.
pub fn schedule_interval(today: NaiveDate, event_date: Option<&str>, default: Duration) -> Duration {
    let Some(date) = event_date.and_then(parse_event_date) else {
        return default;
    };
    match days_until(today, date) {
        -1..=3 => EVENT_WINDOW_INTERVAL,
        -7..=-2 => POST_EVENT_INTERVAL,
        _ => QUIET_INTERVAL,
    }
}

/// Why a refresh was or was not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    Forced,
    ColdStart,
    TooSoon { remaining: Duration },
    QuotaExhausted { used: u64, quota: u32 },
    Due,
}

impl RefreshDecision {
    pub fn should_refresh(&self) -> bool {
        matches!(
            self,
            RefreshDecision::Forced | RefreshDecision::ColdStart | RefreshDecision::Due
        )
    }
}

/// Interval and quota gates for a key that already has a payload.
fn evaluate_gates(
    meta: &KeyMetadata,
    min_interval: Duration,
    daily_quota: Option<u32>,
    now: DateTime<Utc>,
) -> RefreshDecision {
    // A payload without a timestamp (migrated or cleared metadata) counts as ancient.
    if let Some(last_update) = meta.last_update {
        let elapsed = (now - last_update).to_std().unwrap_or(Duration::ZERO);
        if elapsed < min_interval {
            return RefreshDecision::TooSoon {
                remaining: min_interval - elapsed,
            };
        }
    }

    if let Some(quota) = daily_quota {
        let used = meta.calls_in_window(now);
        if used >= u64::from(quota) {
            return RefreshDecision::QuotaExhausted { used, quota };
        }
    }

    RefreshDecision::Due
}

#[derive(Debug, Clone)]
pub struct RefreshGovernor {
    store: Arc<CacheStore>,
}

impl RefreshGovernor {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub fn should_refresh(
        &self,
        key: &str,
        min_interval: Duration,
        daily_quota: Option<u32>,
        force: bool,
    ) -> bool {
        self.evaluate_at(key, min_interval, daily_quota, force, Utc::now())
            .should_refresh()
    }

    pub fn should_refresh_on_schedule(
        &self,
        key: &str,
        event_date: Option<&str>,
        default_interval: Duration,
        daily_quota: Option<u32>,
    ) -> bool {
        self.evaluate_on_schedule_at(key, event_date, default_interval, daily_quota, Utc::now())
            .should_refresh()
    }

    pub fn evaluate_on_schedule_at(
        &self,
        key: &str,
        event_date: Option<&str>,
        default_interval: Duration,
        daily_quota: Option<u32>,
        now: DateTime<Utc>,
    ) -> RefreshDecision {
        let interval = schedule_interval(now.date_naive(), event_date, default_interval);
        debug!(key = %key, ?event_date, interval_secs = interval.as_secs(), "Schedule-aware refresh interval");
        self.evaluate_at(key, interval, daily_quota, false, now)
    }

    /// Run every gate for `key` as of `now`.
    pub fn evaluate_at(
        &self,
        key: &str,
        min_interval: Duration,
        daily_quota: Option<u32>,
        force: bool,
        now: DateTime<Utc>,
    ) -> RefreshDecision {
        let decision = if force {
            RefreshDecision::Forced
        } else if !self.store.has_payload(key) {
            RefreshDecision::ColdStart
        } else {
            evaluate_gates(&self.store.metadata(key), min_interval, daily_quota, now)
        };

        match decision {
            RefreshDecision::QuotaExhausted { used, quota } => {
                warn!(key = %key, used, quota, "Fetch quota reached, serving cached data");
            }
            RefreshDecision::TooSoon { remaining } => {
                debug!(key = %key, remaining_secs = remaining.as_secs(), "Cache still fresh");
            }
            other => debug!(key = %key, decision = ?other, "Refresh allowed"),
        }
        decision
    }
}
