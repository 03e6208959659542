//! Per-peer counting of rejected API keys.

use std::time::Duration;

use metrics::counter;
use moka::sync::Cache;
use tracing::warn;

/// Counts unknown API keys presented by each peer so credential probing shows
/// up in logs and metrics. A peer that stays quiet for `window` is forgotten,
/// and at most `capacity` peers are tracked at once.
#[derive(Debug, Clone)]
pub struct AbuseTracker {
    threshold: u16,
    attempts: Cache<String, u16>,
}

impl AbuseTracker {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(600);
    pub const DEFAULT_CAPACITY: u64 = 50_000;

    pub fn new(threshold: u16) -> Self {
        Self::with_window(threshold, Self::DEFAULT_WINDOW)
    }

    pub fn with_window(threshold: u16, window: Duration) -> Self {
        Self::with_limits(threshold, window, Self::DEFAULT_CAPACITY)
    }

    pub fn with_limits(threshold: u16, window: Duration, capacity: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            attempts: Cache::builder()
                .time_to_idle(window)
                .max_capacity(capacity.max(1))
                .build(),
        }
    }

    pub fn record(&self, peer: impl AsRef<str>) -> AbuseSignal {
        let peer = peer.as_ref();
        let attempts = self
            .attempts
            .entry(peer.to_owned())
            .and_upsert_with(|current| {
                current.map_or(1, |entry| entry.into_value().saturating_add(1))
            })
            .into_value();
        counter!("api_auth_failures_total", "state" => "rejected").increment(1);

        if attempts < self.threshold {
            return AbuseSignal::None;
        }
        counter!("api_auth_failures_total", "state" => "escalated").increment(1);
        warn!(peer, attempts, "invalid api key threshold exceeded");
        AbuseSignal::Escalated { attempts }
    }

    pub fn reset(&self, peer: impl AsRef<str>) {
        self.attempts.invalidate(peer.as_ref());
    }

    /// Peers currently tracked, after pending evictions are applied.
    pub fn tracked(&self) -> u64 {
        self.attempts.run_pending_tasks();
        self.attempts.entry_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbuseSignal {
    None,
    Escalated { attempts: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_per_peer_and_resets() {
        let tracker = AbuseTracker::new(2);
        assert_eq!(tracker.record("10.0.0.1"), AbuseSignal::None);
        assert_eq!(
            tracker.record("10.0.0.1"),
            AbuseSignal::Escalated { attempts: 2 }
        );
        assert_eq!(tracker.record("10.0.0.2"), AbuseSignal::None);
        tracker.reset("10.0.0.1");
        assert_eq!(tracker.record("10.0.0.1"), AbuseSignal::None);
    }

    #[test]
    fn quiet_peers_are_evicted() {
        let tracker = AbuseTracker::with_window(2, Duration::from_millis(50));
        for peer in 0..1_000 {
            tracker.record(format!("10.0.{}.{}", peer / 256, peer % 256));
        }
        assert_eq!(tracker.record("peer"), AbuseSignal::None);

        std::thread::sleep(Duration::from_millis(120));

        assert_eq!(tracker.tracked(), 0);
        assert_eq!(tracker.record("peer"), AbuseSignal::None);
    }

    #[test]
    fn tracked_peers_are_bounded() {
        let tracker = AbuseTracker::with_limits(5, Duration::from_secs(600), 100);
        for peer in 0..5_000 {
            tracker.record(format!("peer-{peer}"));
        }
        assert!(tracker.tracked() <= 100);
    }
}
