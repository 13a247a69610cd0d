//! Failed-decryption bookkeeping used to slow down key guessing.
//!
//! Records are indexed by key fingerprint and live only in this process. Two
//! processes decrypting with the same key keep independent counts; there is no
//! shared store behind this table.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

/// Failures allowed inside one window before further attempts are refused.
pub const DEFAULT_MAX_FAILURES: u32 = 10;
/// Length of the counting window.
pub const DEFAULT_WINDOW_SECS: u64 = 60;
/// Minimum spacing between opportunistic sweeps of stale records.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Limits applied by an [`AttemptTracker`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_failures: u32,
    pub window_secs: u64,
    pub sweep_interval_secs: u64,
}

impl TrackerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            window_secs: DEFAULT_WINDOW_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    count: u32,
    window_start: Instant,
}

struct TrackerState {
    records: HashMap<String, AttemptRecord>,
    last_sweep: Instant,
}

/// Per-key failure counter with a sliding window.
pub struct AttemptTracker {
    config: TrackerConfig,
    state: Mutex<TrackerState>,
}

impl AttemptTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(TrackerState {
                records: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Whether `key_hash` has used up its failures for the current window.
    pub fn is_rate_limited(&self, key_hash: &str) -> bool {
        self.is_rate_limited_at(key_hash, Instant::now())
    }

    /// Counts one failed decryption for `key_hash`.
    pub fn record_failure(&self, key_hash: &str) {
        self.record_failure_at(key_hash, Instant::now());
    }

    /// Drops every record whose window has fully elapsed. Returns how many
    /// records were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Forgets the history for one fingerprint. Returns whether a record existed.
    pub fn clear(&self, key_hash: &str) -> bool {
        self.state.lock().records.remove(key_hash).is_some()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_rate_limited_at(&self, key_hash: &str, now: Instant) -> bool {
        let mut state = self.state.lock();
        if now.saturating_duration_since(state.last_sweep) >= self.config.sweep_interval() {
            let removed = Self::sweep_locked(&mut state, now, self.config.window());
            debug!(removed, remaining = state.records.len(), "swept attempt records");
        }

        let Some(record) = state.records.get(key_hash).copied() else {
            return false;
        };
        if self.window_expired(&record, now) {
            state.records.remove(key_hash);
            return false;
        }
        record.count >= self.config.max_failures
    }

    fn record_failure_at(&self, key_hash: &str, now: Instant) {
        let mut state = self.state.lock();
        let record = state
            .records
            .entry(key_hash.to_string())
            .or_insert(AttemptRecord {
                count: 0,
                window_start: now,
            });

        if self.window_expired(record, now) {
            *record = AttemptRecord {
                count: 1,
                window_start: now,
            };
        } else {
            record.count = record.count.saturating_add(1);
        }

        if record.count == self.config.max_failures {
            let prefix = key_hash.get(..8).unwrap_or(key_hash);
            warn!(
                fingerprint = prefix,
                failures = record.count,
                window_secs = self.config.window_secs,
                "decryption attempts throttled"
            );
        }
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let removed = Self::sweep_locked(&mut state, now, self.config.window());
        debug!(removed, remaining = state.records.len(), "swept attempt records");
        removed
    }

    fn sweep_locked(state: &mut TrackerState, now: Instant, window: Duration) -> usize {
        let before = state.records.len();
        state
            .records
            .retain(|_, record| now.saturating_duration_since(record.window_start) < window);
        state.last_sweep = now;
        before - state.records.len()
    }

    fn window_expired(&self, record: &AttemptRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.window_start) >= self.config.window()
    }
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::{AttemptTracker, TrackerConfig};
    use std::time::{Duration, Instant};

    fn tracker(max_failures: u32) -> AttemptTracker {
        AttemptTracker::new(TrackerConfig {
            max_failures,
            window_secs: 60,
            sweep_interval_secs: 300,
        })
    }

    #[test]
    fn limits_after_threshold() {
        let tracker = tracker(3);
        let now = Instant::now();
        for _ in 0..2 {
            tracker.record_failure_at("k", now);
        }
        assert!(!tracker.is_rate_limited_at("k", now));
        tracker.record_failure_at("k", now);
        assert!(tracker.is_rate_limited_at("k", now));
    }

    #[test]
    fn limits_are_per_fingerprint() {
        let tracker = tracker(1);
        let now = Instant::now();
        tracker.record_failure_at("a", now);
        assert!(tracker.is_rate_limited_at("a", now));
        assert!(!tracker.is_rate_limited_at("b", now));
    }

    #[test]
    fn expired_window_is_forgotten_lazily() {
        let tracker = tracker(2);
        let start = Instant::now();
        tracker.record_failure_at("k", start);
        tracker.record_failure_at("k", start);
        assert!(tracker.is_rate_limited_at("k", start + Duration::from_secs(59)));
        assert!(!tracker.is_rate_limited_at("k", start + Duration::from_secs(60)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn failure_after_expiry_starts_new_window() {
        let tracker = tracker(2);
        let start = Instant::now();
        tracker.record_failure_at("k", start);
        let later = start + Duration::from_secs(61);
        tracker.record_failure_at("k", later);
        assert!(!tracker.is_rate_limited_at("k", later));
        tracker.record_failure_at("k", later);
        assert!(tracker.is_rate_limited_at("k", later));
    }

    #[test]
    fn sweep_removes_only_stale_records() {
        let tracker = tracker(5);
        let start = Instant::now();
        tracker.record_failure_at("old", start);
        tracker.record_failure_at("new", start + Duration::from_secs(50));
        assert_eq!(tracker.sweep_at(start + Duration::from_secs(70)), 1);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn check_triggers_periodic_sweep() {
        let tracker = tracker(5);
        let start = Instant::now();
        tracker.record_failure_at("stale", start);
        // The interval is measured from construction, so a check well past it sweeps.
        tracker.is_rate_limited_at("other", start + Duration::from_secs(400));
        assert!(tracker.is_empty());
    }

    #[test]
    fn clear_removes_record() {
        let tracker = tracker(1);
        tracker.record_failure("k");
        assert!(tracker.is_rate_limited("k"));
        assert!(tracker.clear("k"));
        assert!(!tracker.is_rate_limited("k"));
        assert!(!tracker.clear("k"));
    }

    #[test]
    fn failures_from_many_threads_are_all_counted() {
        let tracker = tracker(41);
        let now = Instant::now();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        tracker.record_failure_at("shared", now);
                    }
                });
            }
        });
        assert!(!tracker.is_rate_limited_at("shared", now));
        tracker.record_failure_at("shared", now);
        assert!(tracker.is_rate_limited_at("shared", now));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn default_config_matches_documented_limits() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_failures, 10);
        assert_eq!(config.window(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
    }
}
