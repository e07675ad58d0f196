use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-owner atomic counters (§4.1 "Statistics", §9 "per-owner atomic
/// counters" redesign note). Each driver owns exactly one of these and
/// is the only writer; readers (the worker, introspection handlers) only
/// load.
#[derive(Debug, Default)]
pub struct DriverStatistics {
    pub successful_reads: AtomicU64,
    pub failed_reads: AtomicU64,
    pub successful_writes: AtomicU64,
    pub failed_writes: AtomicU64,
    pub points_read: AtomicU64,
    pub connection_errors: AtomicU64,
    pub consecutive_failures: AtomicU64,
    min_response_time_ms: AtomicU64,
    max_response_time_ms: AtomicU64,
    total_response_time_ms: AtomicU64,
    response_samples: AtomicU64,
    started_at: std::sync::OnceLock<DateTime<Utc>>,
    last_success: std::sync::Mutex<Option<DateTime<Utc>>>,
    last_error: std::sync::Mutex<Option<DateTime<Utc>>>,
}

/// A point-in-time rendering of [`DriverStatistics`] suitable for
/// introspection and serialization.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatisticsSnapshot {
    pub successful_reads: u64,
    pub failed_reads: u64,
    pub successful_writes: u64,
    pub failed_writes: u64,
    pub points_read: u64,
    pub connection_errors: u64,
    pub consecutive_failures: u64,
    pub min_response_time_ms: Option<u64>,
    pub avg_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<u64>,
}

impl DriverStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        let _ = self.started_at.set(Utc::now());
    }

    pub fn record_read(&self, points: u64, response_time_ms: u64) {
        self.successful_reads.fetch_add(1, Ordering::Relaxed);
        self.points_read.fetch_add(points, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.record_response_time(response_time_ms);
        *self.last_success.lock().unwrap() = Some(Utc::now());
    }

    pub fn record_read_failure(&self) {
        self.failed_reads.fetch_add(1, Ordering::Relaxed);
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap() = Some(Utc::now());
    }

    pub fn record_write(&self, response_time_ms: u64) {
        self.successful_writes.fetch_add(1, Ordering::Relaxed);
        self.record_response_time(response_time_ms);
        *self.last_success.lock().unwrap() = Some(Utc::now());
    }

    pub fn record_write_failure(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap() = Some(Utc::now());
    }

    fn record_response_time(&self, ms: u64) {
        self.total_response_time_ms.fetch_add(ms, Ordering::Relaxed);
        self.response_samples.fetch_add(1, Ordering::Relaxed);
        self.min_response_time_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(if cur == 0 { ms } else { cur.min(ms) })
            })
            .ok();
        self.max_response_time_ms
            .fetch_max(ms, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.successful_reads.store(0, Ordering::Relaxed);
        self.failed_reads.store(0, Ordering::Relaxed);
        self.successful_writes.store(0, Ordering::Relaxed);
        self.failed_writes.store(0, Ordering::Relaxed);
        self.points_read.store(0, Ordering::Relaxed);
        self.connection_errors.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.min_response_time_ms.store(0, Ordering::Relaxed);
        self.max_response_time_ms.store(0, Ordering::Relaxed);
        self.total_response_time_ms.store(0, Ordering::Relaxed);
        self.response_samples.store(0, Ordering::Relaxed);
        *self.last_success.lock().unwrap() = None;
        *self.last_error.lock().unwrap() = None;
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let samples = self.response_samples.load(Ordering::Relaxed);
        let avg = if samples == 0 {
            None
        } else {
            Some(self.total_response_time_ms.load(Ordering::Relaxed) as f64 / samples as f64)
        };
        let min = self.min_response_time_ms.load(Ordering::Relaxed);
        let max = self.max_response_time_ms.load(Ordering::Relaxed);
        StatisticsSnapshot {
            successful_reads: self.successful_reads.load(Ordering::Relaxed),
            failed_reads: self.failed_reads.load(Ordering::Relaxed),
            successful_writes: self.successful_writes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            points_read: self.points_read.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            min_response_time_ms: (samples > 0).then_some(min),
            avg_response_time_ms: avg,
            max_response_time_ms: (samples > 0).then_some(max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_failures_reset_on_success() {
        let stats = DriverStatistics::new();
        stats.record_read_failure();
        stats.record_read_failure();
        assert_eq!(stats.snapshot().consecutive_failures, 2);
        stats.record_read(10, 5);
        assert_eq!(stats.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn response_time_tracks_min_avg_max() {
        let stats = DriverStatistics::new();
        stats.record_read(1, 10);
        stats.record_read(1, 30);
        let snap = stats.snapshot();
        assert_eq!(snap.min_response_time_ms, Some(10));
        assert_eq!(snap.max_response_time_ms, Some(30));
        assert_eq!(snap.avg_response_time_ms, Some(20.0));
    }

    #[test]
    fn reset_clears_all_counters() {
        let stats = DriverStatistics::new();
        stats.record_read(5, 10);
        stats.record_read_failure();
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.successful_reads, 0);
        assert_eq!(snap.points_read, 0);
        assert_eq!(snap.min_response_time_ms, None);
    }
}
