use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

/// A single recorded retry attempt.
///
/// Carried into the DLQ envelope so operators can see the failure history
/// of a dead-lettered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u8,
    /// Error message from the failed attempt.
    pub error: String,
    /// When this attempt occurred.
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u8, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What to do after a recorded failure.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Try again after backoff; `attempt` is the failure just recorded.
    Retry { attempt: u8 },
    /// Retries are spent; the message must be dead-lettered.
    Exhausted { history: Vec<RetryAttempt> },
}

#[derive(Debug)]
struct RetryState {
    history: Vec<RetryAttempt>,
    last_updated: Instant,
}

/// Tracks in-process retry state for messages by correlation id.
///
/// Bounded bookkeeping only: the tracker decides retry-vs-dead-letter,
/// the caller performs the backoff sleep and the DLQ publish.
#[derive(Debug, Default)]
pub struct RetryTracker {
    state: HashMap<String, RetryState>,
    max_retries: u8,
}

impl RetryTracker {
    pub fn new(max_retries: u8) -> Self {
        Self {
            state: HashMap::new(),
            max_retries,
        }
    }

    /// Record a failure for the given correlation id and decide what to
    /// do next. The first `max_retries` failures yield `Retry`; the next
    /// one yields `Exhausted` and forgets the id.
    pub fn record_failure(&mut self, id: &str, error: &str) -> RetryDecision {
        let entry = self.state.entry(id.to_string()).or_insert(RetryState {
            history: Vec::new(),
            last_updated: Instant::now(),
        });

        let attempt = entry.history.len() as u8 + 1;
        entry.history.push(RetryAttempt::new(attempt, error));
        entry.last_updated = Instant::now();

        if attempt <= self.max_retries {
            RetryDecision::Retry { attempt }
        } else {
            let history = self
                .state
                .remove(id)
                .map(|s| s.history)
                .unwrap_or_default();
            RetryDecision::Exhausted { history }
        }
    }

    /// Forget a correlation id (call on success).
    pub fn clear(&mut self, id: &str) {
        self.state.remove(id);
    }

    /// Current failure count for a correlation id.
    pub fn attempts(&self, id: &str) -> u8 {
        self.state.get(id).map(|s| s.history.len() as u8).unwrap_or(0)
    }

    /// Drop entries that have not been touched within `max_age`.
    ///
    /// Entries leak when a process dies mid-retry; the sweep keeps the
    /// map bounded over long uptimes.
    pub fn cleanup_stale(&mut self, max_age: Duration) {
        let now = Instant::now();
        self.state
            .retain(|_, state| now.duration_since(state.last_updated) < max_age);
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// Exponential backoff with jitter.
///
/// `min(base_ms * 2^(attempt-1) + jitter, max_ms)`, jitter in [0, 25%].
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp = 2u64.saturating_pow(u32::from(attempt - 1));
    let delay_ms = base_ms.saturating_mul(exp);
    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}

/// Guard that clears retry state on drop unless defused.
///
/// Keeps the tracker from leaking an entry when a handler exits early on
/// an unexpected path.
pub struct RetryCleanupGuard<'a> {
    tracker: &'a Arc<Mutex<RetryTracker>>,
    id: String,
    defused: bool,
}

impl<'a> RetryCleanupGuard<'a> {
    pub fn new(tracker: &'a Arc<Mutex<RetryTracker>>, id: impl Into<String>) -> Self {
        Self {
            tracker,
            id: id.into(),
            defused: false,
        }
    }

    /// Call when cleanup has been handled explicitly.
    pub fn defuse(&mut self) {
        self.defused = true;
    }
}

impl Drop for RetryCleanupGuard<'_> {
    fn drop(&mut self) {
        if !self.defused {
            if let Ok(mut tracker) = self.tracker.try_lock() {
                tracker.clear(&self.id);
            }
        }
    }
}

/// Spawn a background task that periodically sweeps stale tracker entries.
pub fn spawn_cleanup_task(
    tracker: Arc<Mutex<RetryTracker>>,
    cleanup_interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);

        loop {
            interval.tick().await;
            let removed = {
                let mut guard = tracker.lock().await;
                let before = guard.len();
                guard.cleanup_stale(max_age);
                before - guard.len()
            };
            if removed > 0 {
                info!(removed, "Swept stale retry tracker entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let d1 = calculate_backoff(1, 500, 60000);
        assert!(d1.as_millis() >= 500 && d1.as_millis() <= 625);

        let d2 = calculate_backoff(2, 500, 60000);
        assert!(d2.as_millis() >= 1000 && d2.as_millis() <= 1250);

        let d4 = calculate_backoff(4, 500, 60000);
        assert!(d4.as_millis() >= 4000 && d4.as_millis() <= 5000);
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let d = calculate_backoff(20, 1000, 15000);
        assert_eq!(d.as_millis(), 15000);
    }

    #[test]
    fn test_backoff_zero_attempt() {
        assert_eq!(calculate_backoff(0, 1000, 60000), Duration::ZERO);
    }

    #[test]
    fn test_tracker_retries_then_exhausts() {
        let mut tracker = RetryTracker::new(2);

        for expected in 1..=2u8 {
            match tracker.record_failure("42", "broker unreachable") {
                RetryDecision::Retry { attempt } => assert_eq!(attempt, expected),
                RetryDecision::Exhausted { .. } => panic!("exhausted too early"),
            }
        }

        match tracker.record_failure("42", "broker unreachable") {
            RetryDecision::Exhausted { history } => {
                assert_eq!(history.len(), 3);
                assert_eq!(history[0].attempt, 1);
                assert_eq!(history[2].attempt, 3);
            }
            RetryDecision::Retry { .. } => panic!("expected Exhausted"),
        }

        // Exhaustion forgets the id so a redelivered message starts fresh.
        assert_eq!(tracker.attempts("42"), 0);
    }

    #[test]
    fn test_tracker_ids_are_independent() {
        let mut tracker = RetryTracker::new(3);

        tracker.record_failure("1", "err");
        tracker.record_failure("1", "err");
        tracker.record_failure("2", "err");

        assert_eq!(tracker.attempts("1"), 2);
        assert_eq!(tracker.attempts("2"), 1);
    }

    #[test]
    fn test_tracker_clear() {
        let mut tracker = RetryTracker::new(3);
        tracker.record_failure("1", "err");
        tracker.clear("1");
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_cleanup_stale_drops_old_entries() {
        let mut tracker = RetryTracker::new(3);
        tracker.record_failure("1", "err");
        tracker.record_failure("2", "err");

        tracker.cleanup_stale(Duration::ZERO);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_cleanup_stale_keeps_recent_entries() {
        let mut tracker = RetryTracker::new(3);
        tracker.record_failure("1", "err");

        tracker.cleanup_stale(Duration::from_secs(3600));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.attempts("1"), 1);
    }

    #[tokio::test]
    async fn test_cleanup_guard_clears_on_drop() {
        let tracker = Arc::new(Mutex::new(RetryTracker::new(3)));
        tracker.lock().await.record_failure("1", "err");

        {
            let _guard = RetryCleanupGuard::new(&tracker, "1");
        }

        assert_eq!(tracker.lock().await.attempts("1"), 0);
    }

    #[tokio::test]
    async fn test_cleanup_guard_defused_keeps_state() {
        let tracker = Arc::new(Mutex::new(RetryTracker::new(3)));
        tracker.lock().await.record_failure("1", "err");

        {
            let mut guard = RetryCleanupGuard::new(&tracker, "1");
            guard.defuse();
        }

        assert_eq!(tracker.lock().await.attempts("1"), 1);
    }
}
