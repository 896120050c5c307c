//! Bank structure scanner for raw DAQ event buffers.
//!
//! An event is a tree of self-describing banks. Every bank starts with a
//! length word (number of words that follow it) and a header word:
//!
//! ```text
//! [ length ][ header ][ payload ... ]
//!             bits 8-15  : bank kind (0x10 bank of banks, 0x01 bank of u32)
//!             bits 16-19 : crate id (bank of banks)
//!             bits 16-31 : tag (bank of u32)
//! ```
//!
//! The scanner walks the tree with a single cursor, descending into the crate
//! that carries the helicity scalers and skipping every other crate whole.

use crate::error::DecodeError;
use std::iter::FusedIterator;
use tracing::trace;

const KIND_MASK: u32 = 0xFF00;
/// Bank kind of a bank whose payload is more banks.
pub const BANK_OF_BANKS: u32 = 0x1000;
/// Bank kind of a bank whose payload is 32-bit integers.
pub const BANK_OF_INTEGERS: u32 = 0x0100;
/// Header value that looks like an integer bank but is reserved.
pub const RESERVED_HEADER: u32 = 0xC000_0100;

/// Data words of one matched integer bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBank<'a> {
    /// Crate the bank was found in
    pub crate_id: u8,
    /// Bank tag
    pub tag: u16,
    /// Word offset of the bank header inside the event
    pub offset: usize,
    /// Payload words following the header
    pub words: &'a [u32],
}

/// Lazy iterator over the data banks matching a `(crate, tag)` pair.
///
/// Yields `Err(DecodeError::MalformedBuffer)` at most once, then stops.
#[derive(Debug, Clone)]
pub struct BankScanner<'a> {
    buffer: &'a [u32],
    cursor: usize,
    /// Banks of banks the cursor is inside, innermost last
    enclosing: Vec<Enclosing>,
    target_crate: u8,
    target_tag: u16,
    pending: Option<DecodeError>,
    done: bool,
}

/// A bank of banks being walked: one past its last word, and its crate id.
/// The event wrapper carries no crate id.
#[derive(Debug, Clone, Copy)]
struct Enclosing {
    end: usize,
    crate_id: Option<u8>,
}

/// Scan `buffer` for integer banks tagged `target_tag` inside crate `target_crate`.
///
/// `buffer[0]` must be the event length word. Words beyond the declared event
/// length are ignored.
pub fn scan(buffer: &[u32], target_crate: u8, target_tag: u16) -> BankScanner<'_> {
    let mut pending = None;
    let event = match buffer.first() {
        None => {
            pending = Some(DecodeError::malformed(0, "empty event buffer"));
            buffer
        }
        Some(&declared) => {
            let declared = declared as usize;
            if declared >= buffer.len() {
                pending = Some(DecodeError::malformed(
                    0,
                    format!(
                        "event length {declared} exceeds buffer of {} words",
                        buffer.len()
                    ),
                ));
                buffer
            } else {
                &buffer[..=declared]
            }
        }
    };

    BankScanner {
        buffer: event,
        cursor: 0,
        enclosing: Vec::new(),
        target_crate,
        target_tag,
        pending,
        done: false,
    }
}

impl<'a> BankScanner<'a> {
    /// Crate of the innermost enclosing bank, if any.
    fn current_crate(&self) -> Option<u8> {
        self.enclosing.iter().rev().find_map(|bank| bank.crate_id)
    }

    /// Leave every enclosing bank the cursor has walked past.
    fn leave_finished_banks(&mut self) {
        while let Some(bank) = self.enclosing.last() {
            if self.cursor < bank.end {
                break;
            }
            trace!(end = bank.end, crate_id = ?bank.crate_id, "leaving bank");
            self.enclosing.pop();
        }
    }

    fn fail(&mut self, offset: usize, reason: String) -> Option<Result<DataBank<'a>, DecodeError>> {
        self.done = true;
        Some(Err(DecodeError::malformed(offset, reason)))
    }
}

impl<'a> Iterator for BankScanner<'a> {
    type Item = Result<DataBank<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            self.done = true;
            return Some(Err(err));
        }

        while !self.done {
            self.leave_finished_banks();
            let at = self.cursor;
            let header_at = at + 1;
            let limit = match self.enclosing.last() {
                Some(bank) => bank.end,
                None if header_at < self.buffer.len() => self.buffer.len(),
                None => break,
            };
            if header_at >= limit {
                return self.fail(at, format!("stray word at end of bank ending at {limit}"));
            }

            let banklen = self.buffer[at] as usize;
            let header = self.buffer[header_at];

            if banklen == 0 {
                return self.fail(at, "zero-length bank".to_string());
            }
            // The bank spans header_at..header_at + banklen
            if banklen > limit - header_at {
                let reason = if limit == self.buffer.len() {
                    format!(
                        "bank length {banklen} runs past end of event ({} words)",
                        self.buffer.len()
                    )
                } else {
                    format!("bank length {banklen} runs past end of enclosing bank at {limit}")
                };
                return self.fail(at, reason);
            }
            let next = header_at + banklen;

            trace!(offset = at, banklen, header = format_args!("{header:#010x}"), "bank");

            match header & KIND_MASK {
                BANK_OF_BANKS => {
                    // The outer event wrapper carries no crate id
                    let crate_id = (at > 0).then(|| ((header >> 16) & 0xF) as u8);
                    if crate_id.is_some_and(|id| id != self.target_crate) {
                        self.cursor = next;
                        continue;
                    }
                    self.enclosing.push(Enclosing { end: next, crate_id });
                    self.cursor = header_at + 1;
                }
                BANK_OF_INTEGERS if header != RESERVED_HEADER => {
                    let tag = (header >> 16) as u16;
                    self.cursor = next;
                    if tag == self.target_tag && self.current_crate() == Some(self.target_crate) {
                        return Some(Ok(DataBank {
                            crate_id: self.target_crate,
                            tag,
                            offset: header_at,
                            words: &self.buffer[header_at + 1..next],
                        }));
                    }
                }
                _ => self.cursor = next,
            }
        }

        self.done = true;
        None
    }
}

impl FusedIterator for BankScanner<'_> {}
