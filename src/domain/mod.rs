//! Domain models - code types, GS1 grammar and session state
//!
//! - `gs1` - anchored GS1 element-string matchers, formatting and extraction
//! - `types` - `RawDetection`, `ClassifiedCode`, `ExtractedIdentity`, `SymbolFormat`
//! - `batch` - `BatchState`, `SessionPhase`, `ScanDecision`, `ProgressSnapshot`

pub mod batch;
pub mod gs1;
pub mod types;

pub use batch::{BatchState, OrderedSet, ProgressSnapshot, ScanDecision, SessionPhase};
pub use types::{ClassifiedCode, CodeType, ExtractedIdentity, RawDetection, SymbolFormat};
