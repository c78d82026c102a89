//! Batch-retry aggregation for a scanning session
//!
//! `ScanSession` owns the state of one session:
//! `Idle -> Scanning -> (Confirmed | GtinFallback | TimedOut)`.
//!
//! Sample ticks feed detections in via `ingest`. A batch tick is split in
//! three steps so it can be cancelled without leaving partial state:
//! 1. `batch_query` snapshots the GTINs and candidate serials
//! 2. `resolve` consults the known-valid lookup (async, touches no state)
//! 3. `apply` commits the verdict in one synchronous step

use crate::domain::batch::{BatchState, OrderedSet, ProgressSnapshot, ScanDecision, SessionPhase};
use crate::domain::gs1;
use crate::domain::types::{ExtractedIdentity, RawDetection};
use crate::infra::config::LookupFailurePolicy;
use crate::infra::metrics::ScanMetrics;
use crate::io::known_valid::KnownValidLookup;
use crate::services::classifier::Classifier;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot of what a batch tick must evaluate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery {
    /// GTINs in first-detection order
    pub gtins: Vec<String>,
    /// Serial candidates: the SGTIN serial of each code, or the code itself
    pub candidates: Vec<String>,
}

/// Result of consulting the lookup for one batch tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchVerdict {
    /// First GTIN with a registered serial
    Match { gtin: String, serial: String },
    /// No GTIN had a registered serial
    Miss,
    /// A lookup failed under `SkipTick`; the tick does not count
    Void,
}

/// What a batch tick did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session is not scanning
    Inactive,
    /// Nothing detected yet; no attempt consumed
    Waiting,
    /// Tick voided by a lookup failure; no attempt consumed
    Skipped,
    /// No match; still scanning with this many attempts used
    Retry { attempts: u32 },
    Finished(ScanDecision),
}

/// Consult the lookup for each GTIN in order, stopping at the first match
pub async fn resolve(
    query: &BatchQuery,
    lookup: &dyn KnownValidLookup,
    policy: LookupFailurePolicy,
    metrics: Option<&ScanMetrics>,
) -> BatchVerdict {
    for gtin in &query.gtins {
        let start = Instant::now();
        let result = lookup.lookup(gtin, &query.candidates).await;
        let latency_us = start.elapsed().as_micros() as u64;
        if let Some(m) = metrics {
            m.record_lookup(latency_us, result.is_err());
        }

        match result {
            Ok(matched) => {
                if let Some(serial) = matched.into_iter().next() {
                    return BatchVerdict::Match { gtin: gtin.clone(), serial };
                }
            }
            Err(e) => {
                warn!(
                    gtin = %gtin,
                    error = %e,
                    policy = %policy.as_str(),
                    "known_valid_lookup_failed"
                );
                if policy == LookupFailurePolicy::SkipTick {
                    return BatchVerdict::Void;
                }
            }
        }
    }
    BatchVerdict::Miss
}

/// State machine for one scanning session
pub struct ScanSession {
    session_id: String,
    phase: SessionPhase,
    state: BatchState,
    max_attempts: NonZeroU32,
    classifier: Arc<Classifier>,
    decision: Option<ScanDecision>,
    metrics: Option<Arc<ScanMetrics>>,
}

impl ScanSession {
    pub fn new(classifier: Arc<Classifier>, max_attempts: NonZeroU32) -> Self {
        Self {
            session_id: String::new(),
            phase: SessionPhase::Idle,
            state: BatchState::default(),
            max_attempts,
            classifier,
            decision: None,
            metrics: None,
        }
    }

    /// Create a session with metrics recording
    pub fn with_metrics(mut self, metrics: Arc<ScanMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enter `Scanning` with empty state and a fresh session id
    pub fn start(&mut self) {
        if self.phase == SessionPhase::Scanning {
            info!(session_id = %self.session_id, "scan_session_restarted");
        }
        self.state.reset();
        self.decision = None;
        self.session_id = Uuid::now_v7().to_string();
        self.phase = SessionPhase::Scanning;
        if let Some(ref m) = self.metrics {
            m.record_session_started();
        }
        info!(
            session_id = %self.session_id,
            max_attempts = %self.max_attempts,
            "scan_session_started"
        );
    }

    /// Return to `Idle`, discarding everything accumulated
    pub fn stop(&mut self) {
        if self.phase == SessionPhase::Scanning {
            info!(
                session_id = %self.session_id,
                codes = %self.state.detected_codes.len(),
                attempts = %self.state.attempts,
                "scan_session_stopped"
            );
        }
        self.state.reset();
        self.decision = None;
        self.phase = SessionPhase::Idle;
    }

    /// Sample tick: classify and accumulate detections
    ///
    /// Returns how many new codes or GTINs were added. Repeats are no-ops.
    pub fn ingest(&mut self, detections: &[RawDetection]) -> usize {
        if self.phase != SessionPhase::Scanning {
            if !detections.is_empty() {
                debug!(phase = %self.phase.as_str(), count = %detections.len(), "ingest_ignored");
            }
            return 0;
        }

        let mut added = 0;
        for detection in detections {
            let classified = self.classifier.classify(&detection.value);
            if let Some(ref m) = self.metrics {
                m.record_detection(classified.is_valid);
            }

            let identity = ExtractedIdentity::from_code(&classified);
            let gtin = identity.gtin.or_else(|| detection.retail_gtin());

            if self.state.detected_codes.insert(&classified.code) {
                added += 1;
                debug!(
                    session_id = %self.session_id,
                    code = %classified.code,
                    code_type = %classified.code_type,
                    format = ?detection.format.as_ref().map(|f| f.as_str()),
                    "code_detected"
                );
            }
            if let Some(gtin) = gtin {
                if self.state.detected_gtins.insert(&gtin) {
                    added += 1;
                    debug!(session_id = %self.session_id, gtin = %gtin, "gtin_detected");
                }
            }
        }
        added
    }

    /// Snapshot what the next batch tick must evaluate
    ///
    /// `None` when not scanning or nothing has been detected yet.
    pub fn batch_query(&self) -> Option<BatchQuery> {
        if self.phase != SessionPhase::Scanning || self.state.detected_codes.is_empty() {
            return None;
        }

        let mut candidates = OrderedSet::new();
        for code in self.state.detected_codes.iter() {
            match gs1::extract_serial(code) {
                Some(serial) => candidates.insert(&serial),
                None => candidates.insert(code),
            };
        }

        Some(BatchQuery { gtins: self.state.detected_gtins.to_vec(), candidates: candidates.to_vec() })
    }

    /// Commit a batch verdict
    pub fn apply(&mut self, verdict: BatchVerdict) -> TickOutcome {
        if self.phase != SessionPhase::Scanning {
            return TickOutcome::Inactive;
        }
        if self.state.detected_codes.is_empty() {
            return TickOutcome::Waiting;
        }
        if let Some(ref m) = self.metrics {
            m.record_batch_tick();
        }

        match verdict {
            BatchVerdict::Match { gtin, serial } => {
                let code = gs1::format_sgtin(&gtin, &serial);
                TickOutcome::Finished(self.finish(ScanDecision::Confirmed { code, gtin, serial }))
            }
            BatchVerdict::Void => {
                info!(
                    session_id = %self.session_id,
                    attempts = %self.state.attempts,
                    "batch_tick_skipped"
                );
                TickOutcome::Skipped
            }
            BatchVerdict::Miss => {
                self.state.attempts += 1;
                let attempts = self.state.attempts;
                info!(
                    session_id = %self.session_id,
                    attempts = %attempts,
                    max_attempts = %self.max_attempts,
                    codes = %self.state.detected_codes.len(),
                    gtins = %self.state.detected_gtins.len(),
                    "batch_tick_miss"
                );

                if attempts < self.max_attempts.get() {
                    return TickOutcome::Retry { attempts };
                }

                let decision = if self.state.detected_gtins.is_empty() {
                    ScanDecision::TimedOut {
                        gtins: Vec::new(),
                        unknown_codes: self.state.detected_codes.to_vec(),
                    }
                } else {
                    ScanDecision::GtinFallback { gtins: self.state.detected_gtins.to_vec() }
                };
                TickOutcome::Finished(self.finish(decision))
            }
        }
    }

    /// Batch tick: snapshot, resolve and apply in sequence
    pub async fn batch_tick(
        &mut self,
        lookup: &dyn KnownValidLookup,
        policy: LookupFailurePolicy,
    ) -> TickOutcome {
        let Some(query) = self.batch_query() else {
            return if self.phase == SessionPhase::Scanning {
                TickOutcome::Waiting
            } else {
                TickOutcome::Inactive
            };
        };
        let verdict = resolve(&query, lookup, policy, self.metrics.as_deref()).await;
        self.apply(verdict)
    }

    /// Enter the decision's terminal phase and release accumulated state
    fn finish(&mut self, decision: ScanDecision) -> ScanDecision {
        self.phase = decision.phase();
        self.state.reset();
        self.decision = Some(decision.clone());
        if let Some(ref m) = self.metrics {
            m.record_decision(&decision);
        }

        match &decision {
            ScanDecision::Confirmed { code, .. } => {
                info!(session_id = %self.session_id, code = %code, "scan_confirmed");
            }
            ScanDecision::GtinFallback { gtins } => {
                info!(session_id = %self.session_id, gtins = ?gtins, "scan_gtin_fallback");
            }
            ScanDecision::TimedOut { unknown_codes, .. } => {
                info!(
                    session_id = %self.session_id,
                    unknown_codes = %unknown_codes.len(),
                    "scan_timed_out"
                );
            }
        }
        decision
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            session_id: self.session_id.clone(),
            phase: self.phase,
            detected_codes: self.state.detected_codes.to_vec(),
            detected_gtins: self.state.detected_gtins.to_vec(),
            attempts: self.state.attempts,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.state.attempts
    }

    pub fn max_attempts(&self) -> NonZeroU32 {
        self.max_attempts
    }

    pub fn decision(&self) -> Option<&ScanDecision> {
        self.decision.as_ref()
    }
}
