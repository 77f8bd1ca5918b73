//! Incremental decoder for the line-based event-stream wire format.
//!
//! ```text
//! event: <name>
//! data: <line1>
//! data: <line2>
//!
//! ```
//!
//! A blank line ends a record; `data` lines are joined with `\n`. Lines may
//! end in LF or CRLF and may be split across chunks arbitrarily. Fields other
//! than `event` and `data` are ignored. A line longer than the decoder's
//! line limit is dropped whole.

use bytes::{Bytes, BytesMut};

/// Default cap on a single unterminated line (1 MiB).
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseRecord {
    pub name: String,
    pub data: Bytes,
}

/// Feeds raw body chunks in, hands complete records out.
///
/// Bytes after the last blank line stay buffered; dropping the decoder
/// discards that incomplete record.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    line_limit: usize,
    /// Skipping the rest of an over-long line.
    discarding: bool,
    name: String,
    data: BytesMut,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_line_limit(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that drops lines longer than `line_limit` bytes.
    pub fn with_line_limit(line_limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            line_limit,
            discarding: false,
            name: String::new(),
            data: BytesMut::new(),
        }
    }

    /// Append `chunk` and return every record it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        self.buffer.extend_from_slice(chunk);
        let mut records = Vec::new();
        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') else {
                if self.buffer.len() > self.line_limit {
                    log::warn!(
                        "[PB_REALTIME] Dropping event-stream line longer than {} bytes",
                        self.line_limit
                    );
                    self.buffer.clear();
                    self.discarding = true;
                }
                self.scanned = self.buffer.len();
                break;
            };
            let line = self.buffer.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if let Some(record) = self.process_line(&line) {
                records.push(record);
            }
        }
        records
    }

    /// Whether a partially received record is buffered.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
            || self.discarding
            || !self.name.is_empty()
            || !self.data.is_empty()
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<SseRecord> {
        let line = trim_line_ending(raw);
        if line.is_empty() {
            return self.take_record();
        }

        if let Some(value) = line.strip_prefix(b"event:") {
            self.name = String::from_utf8_lossy(trim_whitespace(value)).into_owned();
        } else if let Some(value) = line.strip_prefix(b"data:") {
            if !self.data.is_empty() {
                self.data.extend_from_slice(b"\n");
            }
            self.data.extend_from_slice(trim_whitespace(value));
        }
        None
    }

    fn take_record(&mut self) -> Option<SseRecord> {
        if self.name.is_empty() && self.data.is_empty() {
            return None;
        }
        Some(SseRecord {
            name: std::mem::take(&mut self.name),
            data: self.data.split().freeze(),
        })
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| *b != b'\n' && *b != b'\r')
        .map_or(0, |pos| pos + 1);
    &line[..end]
}

fn trim_whitespace(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(value.len());
    let end = value
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &value[start..end]
}
