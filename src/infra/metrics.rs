//! Lock-free scan metrics and periodic reporting
//!
//! NOTE: All atomics use Relaxed ordering intentionally - these are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use crate::domain::batch::ScanDecision;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector for scanning sessions
pub struct ScanMetrics {
    /// Sessions started (monotonic)
    sessions_started: AtomicU64,
    /// Raw detections fed into sessions (monotonic)
    detections_total: AtomicU64,
    /// Detections since last report (reset on report)
    detections_since_report: AtomicU64,
    /// Detections that classified as a valid code (monotonic)
    valid_codes_total: AtomicU64,
    /// Batch ticks that evaluated at least one code (monotonic)
    batch_ticks_total: AtomicU64,
    /// Known-valid lookups issued (monotonic)
    lookups_total: AtomicU64,
    /// Known-valid lookups that returned an error (monotonic)
    lookup_failures_total: AtomicU64,
    /// Sum of lookup latencies in microseconds (reset on report)
    lookup_latency_sum_us: AtomicU64,
    /// Max lookup latency in microseconds (reset on report)
    lookup_latency_max_us: AtomicU64,
    /// Lookups since last report (reset on report)
    lookups_since_report: AtomicU64,
    confirmed_total: AtomicU64,
    gtin_fallback_total: AtomicU64,
    timed_out_total: AtomicU64,
    /// Session events dropped due to channel full (monotonic)
    events_dropped: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            detections_total: AtomicU64::new(0),
            detections_since_report: AtomicU64::new(0),
            valid_codes_total: AtomicU64::new(0),
            batch_ticks_total: AtomicU64::new(0),
            lookups_total: AtomicU64::new(0),
            lookup_failures_total: AtomicU64::new(0),
            lookup_latency_sum_us: AtomicU64::new(0),
            lookup_latency_max_us: AtomicU64::new(0),
            lookups_since_report: AtomicU64::new(0),
            confirmed_total: AtomicU64::new(0),
            gtin_fallback_total: AtomicU64::new(0),
            timed_out_total: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_detection(&self, valid: bool) {
        self.detections_total.fetch_add(1, Ordering::Relaxed);
        self.detections_since_report.fetch_add(1, Ordering::Relaxed);
        if valid {
            self.valid_codes_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_batch_tick(&self) {
        self.batch_ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one lookup round-trip
    #[inline]
    pub fn record_lookup(&self, latency_us: u64, failed: bool) {
        self.lookups_total.fetch_add(1, Ordering::Relaxed);
        self.lookups_since_report.fetch_add(1, Ordering::Relaxed);
        self.lookup_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.lookup_latency_max_us, latency_us);
        if failed {
            self.lookup_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_decision(&self, decision: &ScanDecision) {
        let counter = match decision {
            ScanDecision::Confirmed { .. } => &self.confirmed_total,
            ScanDecision::GtinFallback { .. } => &self.gtin_fallback_total,
            ScanDecision::TimedOut { .. } => &self.timed_out_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn detections_total(&self) -> u64 {
        self.detections_total.load(Ordering::Relaxed)
    }

    pub fn lookups_total(&self) -> u64 {
        self.lookups_total.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot counters, resetting the per-interval ones
    pub fn report(&self) -> MetricsSummary {
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };

        let detections = self.detections_since_report.swap(0, Ordering::Relaxed);
        let lookups = self.lookups_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.lookup_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.lookup_latency_max_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            detections_total: self.detections_total.load(Ordering::Relaxed),
            detections_per_sec: if elapsed_secs > 0.0 { detections as f64 / elapsed_secs } else { 0.0 },
            valid_codes_total: self.valid_codes_total.load(Ordering::Relaxed),
            batch_ticks_total: self.batch_ticks_total.load(Ordering::Relaxed),
            lookups_total: self.lookups_total.load(Ordering::Relaxed),
            lookup_failures_total: self.lookup_failures_total.load(Ordering::Relaxed),
            lookup_avg_us: if lookups > 0 { latency_sum / lookups } else { 0 },
            lookup_max_us: latency_max,
            confirmed_total: self.confirmed_total.load(Ordering::Relaxed),
            gtin_fallback_total: self.gtin_fallback_total.load(Ordering::Relaxed),
            timed_out_total: self.timed_out_total.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the scan metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub sessions_started: u64,
    pub detections_total: u64,
    pub detections_per_sec: f64,
    pub valid_codes_total: u64,
    pub batch_ticks_total: u64,
    pub lookups_total: u64,
    pub lookup_failures_total: u64,
    /// Average lookup latency over the last interval (µs)
    pub lookup_avg_us: u64,
    /// Max lookup latency over the last interval (µs)
    pub lookup_max_us: u64,
    pub confirmed_total: u64,
    pub gtin_fallback_total: u64,
    pub timed_out_total: u64,
    pub events_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            sessions = %self.sessions_started,
            detections_total = %self.detections_total,
            detections_per_sec = format!("{:.1}", self.detections_per_sec),
            valid_codes = %self.valid_codes_total,
            batch_ticks = %self.batch_ticks_total,
            lookups = %self.lookups_total,
            lookup_failures = %self.lookup_failures_total,
            lookup_avg_us = %self.lookup_avg_us,
            lookup_max_us = %self.lookup_max_us,
            confirmed = %self.confirmed_total,
            gtin_fallback = %self.gtin_fallback_total,
            timed_out = %self.timed_out_total,
            events_dropped = %self.events_dropped,
            "metrics"
        );
    }
}
