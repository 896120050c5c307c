//! Minimal event dump container.
//!
//! A dump is a flat sequence of little-endian `u32` records:
//!
//! ```text
//! [ event type ][ event length N ][ N event words ] [ event type ] ...
//! ```
//!
//! The event words are stored exactly as delivered, length word included, so a
//! replay hands the pipeline the same buffers the acquisition saw.

use crate::error::{HelicityError, HelicityResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs;
use std::path::Path;

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpedEvent {
    /// Event type delivered with the event
    pub event_type: u32,
    /// Raw event words, starting with the length word
    pub words: Vec<u32>,
}

impl DumpedEvent {
    /// Record an event.
    pub fn new(event_type: u32, words: Vec<u32>) -> Self {
        Self { event_type, words }
    }
}

/// Serialize events into dump bytes.
///
/// Events whose length word disagrees with their buffer are rejected, since the
/// framing relies on it.
pub fn encode(events: &[DumpedEvent]) -> HelicityResult<Bytes> {
    let words: usize = events.iter().map(|e| e.words.len() + 1).sum();
    let mut buf = BytesMut::with_capacity(words * 4);
    for (index, event) in events.iter().enumerate() {
        match event.words.first() {
            Some(&len) if len as usize + 1 == event.words.len() => {}
            _ => {
                return Err(HelicityError::Dump {
                    offset: buf.len(),
                    reason: format!("event {index} length word does not match its buffer"),
                })
            }
        }
        buf.put_u32_le(event.event_type);
        for &word in &event.words {
            buf.put_u32_le(word);
        }
    }
    Ok(buf.freeze())
}

/// Parse dump bytes back into events.
pub fn decode(mut bytes: Bytes) -> HelicityResult<Vec<DumpedEvent>> {
    let total = bytes.len();
    let mut events = Vec::new();

    while bytes.has_remaining() {
        let offset = total - bytes.remaining();
        if bytes.remaining() < 8 {
            return Err(truncated(offset, "record header"));
        }
        let event_type = bytes.get_u32_le();
        let len = bytes.get_u32_le() as usize;
        if bytes.remaining() / 4 < len {
            return Err(truncated(offset, &format!("event of {len} words")));
        }
        let mut words = Vec::with_capacity(len + 1);
        words.push(len as u32);
        for _ in 0..len {
            words.push(bytes.get_u32_le());
        }
        events.push(DumpedEvent { event_type, words });
    }
    Ok(events)
}

fn truncated(offset: usize, what: &str) -> HelicityError {
    HelicityError::Dump {
        offset,
        reason: format!("truncated {what}"),
    }
}

/// Read and parse a dump file.
pub fn read_file(path: impl AsRef<Path>) -> HelicityResult<Vec<DumpedEvent>> {
    let bytes = fs::read(path)?;
    decode(Bytes::from(bytes))
}

/// Encode events and write them to a dump file.
pub fn write_file(path: impl AsRef<Path>, events: &[DumpedEvent]) -> HelicityResult<()> {
    fs::write(path, encode(events)?)?;
    Ok(())
}
