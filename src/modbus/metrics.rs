use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Counters of bus transactions, shared by every module reader
#[derive(Debug, Default)]
pub struct BusMetrics {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    total_response_ms: AtomicU64,
    last: Mutex<LastSeen>,
}

#[derive(Debug, Default, Clone, Copy)]
struct LastSeen {
    request: Option<DateTime<Utc>>,
    success: Option<DateTime<Utc>>,
    failure: Option<DateTime<Utc>>,
}

/// Point-in-time copy of [`BusMetrics`]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BusStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_ms: f64,
    pub success_rate_percent: f64,
    pub last_request: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.record_at(elapsed, Utc::now(), true);
    }

    pub fn record_failure(&self, elapsed: Duration) {
        self.record_at(elapsed, Utc::now(), false);
    }

    fn record_at(&self, elapsed: Duration, at: DateTime<Utc>, ok: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.total_response_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);

        let mut last = self.last.lock();
        last.request = Some(at);
        if ok {
            self.successful.fetch_add(1, Ordering::Relaxed);
            last.success = Some(at);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            last.failure = Some(at);
        }
    }

    pub fn snapshot(&self) -> BusStats {
        let last = *self.last.lock();
        let total = self.total.load(Ordering::Relaxed);
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let response_ms = self.total_response_ms.load(Ordering::Relaxed);

        let (average_response_ms, success_rate_percent) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                response_ms as f64 / total as f64,
                successful as f64 * 100.0 / total as f64,
            )
        };

        BusStats {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            average_response_ms,
            success_rate_percent,
            last_request: last.request,
            last_success: last.success,
            last_failure: last.failure,
        }
    }
}

impl BusStats {
    /// True when the bus has been failing for longer than `threshold`
    /// without a single successful transaction in between.
    pub fn is_stalled(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        match (self.last_success, self.last_failure) {
            (Some(success), Some(failure)) => failure > success && now - success > threshold,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

/// Log bus statistics every `period` until `shutdown` fires
pub async fn run_monitor(
    metrics: Arc<BusMetrics>,
    period: Duration,
    stall_threshold: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // first tick completes immediately
    interval.tick().await;

    let stall_threshold =
        chrono::Duration::from_std(stall_threshold).unwrap_or_else(|_| chrono::Duration::seconds(30));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let stats = metrics.snapshot();
                info!(
                    total = stats.total_requests,
                    successful = stats.successful_requests,
                    failed = stats.failed_requests,
                    avg_response_ms = stats.average_response_ms,
                    success_rate = stats.success_rate_percent,
                    "bus statistics"
                );

                if stats.is_stalled(Utc::now(), stall_threshold) {
                    warn!(
                        last_success = ?stats.last_success,
                        last_failure = ?stats.last_failure,
                        "no successful bus transaction recently"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let stats = BusMetrics::new().snapshot();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.average_response_ms, 0.0);
        assert_eq!(stats.success_rate_percent, 0.0);
        assert!(stats.last_request.is_none());
    }

    #[test]
    fn test_counts_and_rates() {
        let metrics = BusMetrics::new();
        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(200));
        metrics.record_success(Duration::from_millis(300));
        metrics.record_failure(Duration::from_millis(2000));

        let stats = metrics.snapshot();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.successful_requests, 3);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.average_response_ms, 650.0);
        assert_eq!(stats.success_rate_percent, 75.0);
        assert!(stats.last_success.is_some());
        assert!(stats.last_failure.is_some());
        assert_eq!(stats.last_request, stats.last_failure);
    }

    #[test]
    fn test_stall_detection() {
        let metrics = BusMetrics::new();
        let t0 = Utc::now();
        metrics.record_at(Duration::from_millis(50), t0, true);
        metrics.record_at(
            Duration::from_millis(2000),
            t0 + chrono::Duration::seconds(40),
            false,
        );
        let stats = metrics.snapshot();
        let threshold = chrono::Duration::seconds(30);

        assert!(stats.is_stalled(t0 + chrono::Duration::seconds(41), threshold));
        assert!(!stats.is_stalled(t0 + chrono::Duration::seconds(10), threshold));

        metrics.record_at(
            Duration::from_millis(50),
            t0 + chrono::Duration::seconds(45),
            true,
        );
        let recovered = metrics.snapshot();
        assert!(!recovered.is_stalled(t0 + chrono::Duration::seconds(50), threshold));
    }

    #[test]
    fn test_never_succeeded_is_stalled() {
        let metrics = BusMetrics::new();
        metrics.record_failure(Duration::from_millis(10));
        assert!(metrics
            .snapshot()
            .is_stalled(Utc::now(), chrono::Duration::seconds(30)));
    }
}
