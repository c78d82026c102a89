//! Services - classification and session logic
//!
//! - `classifier` - Raw string to typed, normalized product code
//! - `aggregator` - Batch-retry state machine for one scanning session
//! - `runner` - Drives a session on sample and batch timers
//! - `single_shot` - One-image decoding and product links

pub mod aggregator;
pub mod classifier;
pub mod runner;
pub mod single_shot;

pub use aggregator::{resolve, BatchQuery, BatchVerdict, ScanSession, TickOutcome};
pub use classifier::{classify_data_matrix, Classifier, DEFAULT_SMARTLINK_DOMAINS};
pub use runner::{ScanHandle, ScanRunner};
pub use single_shot::{first_valid_code, product_link};
