//! IO modules - collaborator interfaces
//!
//! - `detection` - Detection sources polled on each sample tick, line reader
//! - `known_valid` - Known-valid GTIN/serial lookup and its in-memory table
//! - `events` - Typed channel for progress snapshots and terminal decisions

pub mod detection;
pub mod events;
pub mod known_valid;

pub use detection::{
    forward_detection_lines, parse_detection_line, ChannelSource, DetectionSource, ScriptedSource,
};
pub use events::{create_event_channel, EventSender, SessionEvent};
pub use known_valid::{KnownValidLookup, KnownValidTable};
