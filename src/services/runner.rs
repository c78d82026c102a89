//! Session runner - drives a `ScanSession` on sample and batch timers
//!
//! The runner owns the session for its whole lifetime. Each sample tick polls
//! the detection source and ingests what it returns. Each batch tick
//! snapshots the session, resolves it against the known-valid lookup and
//! commits the verdict. A stop signal cancels an in-flight lookup before its
//! verdict is applied, so a stopped session never reaches a terminal state.

use crate::domain::batch::ScanDecision;
use crate::infra::config::{Config, LookupFailurePolicy};
use crate::infra::metrics::ScanMetrics;
use crate::io::detection::DetectionSource;
use crate::io::events::EventSender;
use crate::io::known_valid::KnownValidLookup;
use crate::services::aggregator::{resolve, ScanSession, TickOutcome};
use crate::services::classifier::Classifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Owns everything one scanning session needs to run
pub struct ScanRunner {
    session: ScanSession,
    lookup: Arc<dyn KnownValidLookup>,
    events: EventSender,
    policy: LookupFailurePolicy,
    sample_interval: Duration,
    batch_interval: Duration,
    metrics: Option<Arc<ScanMetrics>>,
}

impl ScanRunner {
    pub fn new(
        config: &Config,
        classifier: Arc<Classifier>,
        lookup: Arc<dyn KnownValidLookup>,
        events: EventSender,
    ) -> Self {
        Self {
            session: ScanSession::new(classifier, config.max_attempts()),
            lookup,
            events,
            policy: config.lookup_failure_policy(),
            sample_interval: config.sample_interval(),
            batch_interval: config.batch_interval(),
            metrics: None,
        }
    }

    /// Create a runner with metrics recording
    pub fn with_metrics(mut self, metrics: Arc<ScanMetrics>) -> Self {
        self.session = self.session.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Start the session on a background task
    pub fn spawn(self, source: Box<dyn DetectionSource>) -> ScanHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(source, stop_rx));
        ScanHandle { stop_tx, task }
    }

    /// Run until a terminal decision or a stop signal
    ///
    /// Returns the decision, or `None` if the session was stopped first.
    pub async fn run(
        mut self,
        mut source: Box<dyn DetectionSource>,
        mut stop: watch::Receiver<bool>,
    ) -> Option<ScanDecision> {
        self.session.start();
        let session_id = self.session.session_id().to_string();
        self.events.send_progress(self.session.snapshot());

        // First ticks fire one period after start, not immediately
        let start = Instant::now();
        let mut sample_tick = interval_at(start + self.sample_interval, self.sample_interval);
        let mut batch_tick = interval_at(start + self.batch_interval, self.batch_interval);
        sample_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        batch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            session_id = %session_id,
            sample_interval_ms = %self.sample_interval.as_millis(),
            batch_interval_ms = %self.batch_interval.as_millis(),
            policy = %self.policy.as_str(),
            "scan_runner_started"
        );

        loop {
            tokio::select! {
                biased;

                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }

                _ = sample_tick.tick() => {
                    let detections = source.detect().await;
                    if detections.is_empty() {
                        continue;
                    }
                    if self.session.ingest(&detections) > 0 {
                        self.events.send_progress(self.session.snapshot());
                    }
                }

                _ = batch_tick.tick() => {
                    let Some(query) = self.session.batch_query() else {
                        continue;
                    };

                    let verdict = tokio::select! {
                        biased;
                        _ = stop.changed() => {
                            debug!(session_id = %session_id, "batch_lookup_cancelled");
                            break;
                        }
                        verdict = resolve(&query, self.lookup.as_ref(), self.policy, self.metrics.as_deref()) => verdict,
                    };

                    match self.session.apply(verdict) {
                        TickOutcome::Finished(decision) => {
                            self.events.send_finished(&session_id, &decision).await;
                            return Some(decision);
                        }
                        TickOutcome::Retry { .. } | TickOutcome::Skipped => {
                            self.events.send_progress(self.session.snapshot());
                        }
                        TickOutcome::Waiting | TickOutcome::Inactive => {}
                    }
                }
            }
        }

        self.session.stop();
        self.events.send_stopped(&session_id).await;
        info!(session_id = %session_id, "scan_runner_stopped");
        None
    }
}

/// Handle to a running session
///
/// Dropping the handle stops the session.
pub struct ScanHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Option<ScanDecision>>,
}

impl ScanHandle {
    /// Signal the session to stop. Accumulated state is discarded.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the session to finish
    ///
    /// Must be awaited to completion at most once.
    pub async fn join(&mut self) -> Option<ScanDecision> {
        match (&mut self.task).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "scan_runner_task_failed");
                None
            }
        }
    }

    /// Stop the session and wait for it to wind down
    pub async fn stop_and_join(mut self) -> Option<ScanDecision> {
        self.stop();
        self.join().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::SessionPhase;
    use crate::domain::types::RawDetection;
    use crate::io::detection::ScriptedSource;
    use crate::io::events::{create_event_channel, SessionEvent};
    use crate::io::known_valid::KnownValidTable;
    use async_trait::async_trait;
    use std::num::NonZeroU32;

    fn config() -> Config {
        Config::default()
            .with_intervals(Duration::from_millis(100), Duration::from_millis(3000))
            .with_max_attempts(NonZeroU32::new(3).unwrap())
    }

    fn table() -> Arc<dyn KnownValidLookup> {
        let mut table = KnownValidTable::new();
        table.insert("12345678901234", ["SERIAL123", "SERIAL456"]);
        Arc::new(table)
    }

    fn scripted(values: &[&str]) -> Box<dyn DetectionSource> {
        Box::new(ScriptedSource::new(vec![values.iter().map(|v| RawDetection::new(*v)).collect()]))
    }

    /// Lookup that never answers
    struct HangingLookup;

    #[async_trait]
    impl KnownValidLookup for HangingLookup {
        async fn lookup(&self, _gtin: &str, _candidates: &[String]) -> anyhow::Result<Vec<String>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_on_first_batch_tick() {
        let (events, mut rx) = create_event_channel(64);
        let runner = ScanRunner::new(&config(), Arc::new(Classifier::default()), table(), events);
        let mut handle = runner.spawn(scripted(&["011234567890123421SERIAL123"]));

        let decision = handle.join().await.unwrap();

        assert_eq!(
            decision,
            ScanDecision::Confirmed {
                code: "011234567890123421SERIAL123".to_string(),
                gtin: "12345678901234".to_string(),
                serial: "SERIAL123".to_string(),
            }
        );

        let mut saw_finished = false;
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Finished { decision: ref d, .. } = event {
                assert_eq!(d, &decision);
                saw_finished = true;
            }
        }
        assert!(saw_finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_after_three_misses() {
        let (events, mut rx) = create_event_channel(64);
        let runner = ScanRunner::new(&config(), Arc::new(Classifier::default()), table(), events);
        let started = Instant::now();
        let mut handle = runner.spawn(scripted(&["011234567890123421UNKNOWN1"]));

        let decision = handle.join().await.unwrap();

        assert_eq!(decision, ScanDecision::GtinFallback { gtins: vec!["12345678901234".to_string()] });
        assert!(started.elapsed() >= Duration::from_millis(9000));

        let attempts: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                SessionEvent::Progress(snapshot) => Some(snapshot.attempts),
                _ => None,
            })
            .collect();
        assert_eq!(attempts.last(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_detected_never_times_out() {
        let (events, _rx) = create_event_channel(64);
        let runner = ScanRunner::new(&config(), Arc::new(Classifier::default()), table(), events);
        let handle = runner.spawn(scripted(&[]));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!handle.is_finished());

        assert_eq!(handle.stop_and_join().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_delivered_on_single_slot_channel() {
        let (events, mut rx) = create_event_channel(1);
        let runner = ScanRunner::new(&config(), Arc::new(Classifier::default()), table(), events);
        let mut handle = runner.spawn(scripted(&["011234567890123421SERIAL123"]));

        let decision = handle.join().await.unwrap();

        let last = std::iter::from_fn(|| rx.try_recv().ok()).last();
        assert!(matches!(
            last,
            Some(SessionEvent::Finished { decision: ref d, .. }) if *d == decision
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_delivered_on_single_slot_channel() {
        let (events, mut rx) = create_event_channel(1);
        let runner = ScanRunner::new(&config(), Arc::new(Classifier::default()), table(), events);
        let handle = runner.spawn(scripted(&["noise"]));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.stop_and_join().await, None);

        let last = std::iter::from_fn(|| rx.try_recv().ok()).last();
        assert!(matches!(last, Some(SessionEvent::Stopped { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_in_flight_lookup() {
        let (events, mut rx) = create_event_channel(64);
        let metrics = Arc::new(ScanMetrics::new());
        let runner = ScanRunner::new(
            &config(),
            Arc::new(Classifier::default()),
            Arc::new(HangingLookup),
            events,
        )
        .with_metrics(metrics.clone());
        let handle = runner.spawn(scripted(&["011234567890123421SERIAL123"]));

        // Past the first batch tick; the lookup is now pending
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(handle.stop_and_join().await, None);

        let summary = metrics.report();
        assert_eq!(summary.batch_ticks_total, 0);
        assert_eq!(summary.confirmed_total, 0);

        let last = std::iter::from_fn(|| rx.try_recv().ok()).last();
        assert!(matches!(last, Some(SessionEvent::Stopped { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_scanning_phase() {
        let (events, mut rx) = create_event_channel(64);
        let runner = ScanRunner::new(&config(), Arc::new(Classifier::default()), table(), events);
        let handle = runner.spawn(scripted(&["noise"]));

        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.stop_and_join().await;

        let progress: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                SessionEvent::Progress(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect();
        assert!(progress.iter().all(|s| s.phase == SessionPhase::Scanning));
        assert!(progress.iter().any(|s| s.detected_codes == vec!["noise".to_string()]));
    }
}
