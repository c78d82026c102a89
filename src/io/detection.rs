//! Detection sources - where raw scanner values come from
//!
//! A session polls its `DetectionSource` once per sample tick. The line reader
//! turns a text stream (stdin, a serial bridge, a pipe) into detections:
//! one detection per line, either `<format>\t<value>` or a bare `<value>`.

use crate::domain::types::{RawDetection, SymbolFormat};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Scanning collaborator polled on every sample tick
#[async_trait]
pub trait DetectionSource: Send {
    /// Everything detected since the previous call. May be empty; never fails.
    async fn detect(&mut self) -> Vec<RawDetection>;
}

/// Drains detections pushed into an mpsc channel without waiting
pub struct ChannelSource {
    rx: mpsc::Receiver<RawDetection>,
    closed: bool,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<RawDetection>) -> Self {
        Self { rx, closed: false }
    }

    /// Whether every sender has gone away and the buffer is drained
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl DetectionSource for ChannelSource {
    async fn detect(&mut self) -> Vec<RawDetection> {
        let mut batch = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(detection) => batch.push(detection),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        debug!("detection_channel_closed");
                        self.closed = true;
                    }
                    break;
                }
            }
        }
        batch
    }
}

/// Replays pre-recorded detection batches, one batch per sample tick
#[derive(Debug, Default)]
pub struct ScriptedSource {
    batches: VecDeque<Vec<RawDetection>>,
}

impl ScriptedSource {
    pub fn new<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = Vec<RawDetection>>,
    {
        Self { batches: batches.into_iter().collect() }
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

#[async_trait]
impl DetectionSource for ScriptedSource {
    async fn detect(&mut self) -> Vec<RawDetection> {
        self.batches.pop_front().unwrap_or_default()
    }
}

/// Parse one `<format>\t<value>` or `<value>` line
///
/// Carriage returns, newlines and a byte-order mark are stripped from the
/// ends; other whitespace is part of the value. Empty lines yield nothing.
pub fn parse_detection_line(line: &str) -> Option<RawDetection> {
    let line = line.trim_matches(|c: char| c == '\r' || c == '\n' || c == '\u{FEFF}');
    if line.is_empty() {
        return None;
    }

    match line.split_once('\t') {
        Some((format, value)) if !value.is_empty() => {
            let format = format.trim();
            let detection = RawDetection::new(value);
            if format.is_empty() {
                Some(detection)
            } else {
                // Infallible: unknown names become SymbolFormat::Other
                let format = format.parse::<SymbolFormat>().unwrap_or_else(|e| match e {});
                Some(detection.with_format(format))
            }
        }
        Some(_) => None,
        None => Some(RawDetection::new(line)),
    }
}

/// Read detection lines until EOF or shutdown, forwarding them to `tx`
///
/// Uses try_send so a slow session never stalls the reader; drops are
/// logged. Returns the number of detections forwarded.
pub async fn forward_detection_lines<R>(
    reader: R,
    tx: mpsc::Sender<RawDetection>,
    mut shutdown: watch::Receiver<bool>,
) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("detection_reader_shutdown");
                    break;
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let Some(detection) = parse_detection_line(&line) else {
                            continue;
                        };
                        match tx.try_send(detection) {
                            Ok(()) => forwarded += 1,
                            Err(TrySendError::Full(d)) => {
                                warn!(value = %d.value, "detection_dropped: channel full");
                            }
                            Err(TrySendError::Closed(_)) => {
                                debug!("detection_channel_closed");
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        info!(forwarded = %forwarded, "detection_input_eof");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "detection_read_failed");
                        break;
                    }
                }
            }
        }
    }

    forwarded
}
