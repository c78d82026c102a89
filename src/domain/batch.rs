//! Batch state, session phases and terminal decisions

use rustc_hash::FxHashSet;
use serde::Serialize;

/// Set of strings that remembers insertion order
#[derive(Debug, Clone, Default)]
pub struct OrderedSet {
    items: Vec<String>,
    seen: FxHashSet<String>,
}

impl OrderedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning false if it was already present
    pub fn insert(&mut self, value: &str) -> bool {
        if self.seen.contains(value) {
            return false;
        }
        self.seen.insert(value.to_string());
        self.items.push(value.to_string());
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.items.clone()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.seen.clear();
    }
}

impl<'a> FromIterator<&'a str> for OrderedSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = OrderedSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

/// Accumulated detections for one scanning session
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    pub detected_gtins: OrderedSet,
    pub detected_codes: OrderedSet,
    pub attempts: u32,
}

impl BatchState {
    pub fn reset(&mut self) {
        self.detected_gtins.clear();
        self.detected_codes.clear();
        self.attempts = 0;
    }
}

/// Lifecycle phase of a scanning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Scanning,
    Confirmed,
    GtinFallback,
    TimedOut,
}

impl SessionPhase {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Confirmed | SessionPhase::GtinFallback | SessionPhase::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Scanning => "scanning",
            SessionPhase::Confirmed => "confirmed",
            SessionPhase::GtinFallback => "gtin_fallback",
            SessionPhase::TimedOut => "timed_out",
        }
    }
}

/// Terminal outcome of a scanning session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanDecision {
    /// A registered GTIN/serial pair was found; `code` is its SGTIN element string
    Confirmed { code: String, gtin: String, serial: String },
    /// Attempts ran out but at least one GTIN was seen
    GtinFallback { gtins: Vec<String> },
    /// Attempts ran out with no GTIN; carries everything that was read
    TimedOut { gtins: Vec<String>, unknown_codes: Vec<String> },
}

impl ScanDecision {
    pub fn phase(&self) -> SessionPhase {
        match self {
            ScanDecision::Confirmed { .. } => SessionPhase::Confirmed,
            ScanDecision::GtinFallback { .. } => SessionPhase::GtinFallback,
            ScanDecision::TimedOut { .. } => SessionPhase::TimedOut,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.phase().as_str()
    }
}

/// Per-tick view of a session for presentation layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub detected_codes: Vec<String>,
    pub detected_gtins: Vec<String>,
    pub attempts: u32,
}
