//! Window records inside a helicity scaler bank.
//!
//! The first payload word of the bank is a bank-level header. It is followed by
//! one record per helicity window, each `num_channels` words long. The upper
//! byte of every word carries status flags; the count lives in the low 24 bits.
//! Bits 31 and 30 of the record's first word are the quartet flag and the
//! reported helicity bit.

use super::bank::DataBank;

/// Count bits of a scaler word.
pub const COUNT_MASK: u32 = 0x00FF_FFFF;
/// A bank with more records than this means the beam was off for a long stretch.
pub const MAX_RECORDS_PER_BANK: usize = 100;

const QUARTET_FLAG: u32 = 1 << 31;
const HELICITY_BIT: u32 = 1 << 30;

/// Helicity bits reported by the electronics for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportedBits {
    /// Quartet flag
    pub quartet: bool,
    /// Reported (delayed) helicity bit, `true` for positive
    pub helicity: bool,
}

/// One window record.
#[derive(Debug, Clone, Copy)]
pub struct ScalerRecord<'a> {
    words: &'a [u32],
}

impl<'a> ScalerRecord<'a> {
    /// Wrap the words of a single record.
    pub fn new(words: &'a [u32]) -> Self {
        Self { words }
    }

    /// Number of channels in the record
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the record has no channels
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Quartet flag and helicity bit of this window.
    pub fn reported(&self) -> ReportedBits {
        let first = self.words.first().copied().unwrap_or(0);
        ReportedBits {
            quartet: first & QUARTET_FLAG != 0,
            helicity: first & HELICITY_BIT != 0,
        }
    }

    /// Count of one channel, `None` past the end of the record.
    pub fn count(&self, channel: usize) -> Option<u32> {
        self.words.get(channel).map(|word| word & COUNT_MASK)
    }

    /// Masked counts of every channel in order.
    pub fn counts(&self) -> impl Iterator<Item = u32> + 'a {
        self.words.iter().map(|word| word & COUNT_MASK)
    }
}

/// Number of complete records in a bank payload of `payload_len` words.
pub fn record_count(payload_len: usize, num_channels: usize) -> usize {
    if num_channels == 0 {
        return 0;
    }
    payload_len.saturating_sub(1) / num_channels
}

/// Records of a matched bank. Trailing partial records are dropped.
pub fn records<'a>(
    bank: &DataBank<'a>,
    num_channels: usize,
) -> impl Iterator<Item = ScalerRecord<'a>> + 'a {
    let words: &'a [u32] = bank.words;
    let payload = words.get(1..).unwrap_or(&[]);
    payload
        .chunks_exact(num_channels.max(1))
        .take(record_count(words.len(), num_channels))
        .map(ScalerRecord::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(words: &[u32]) -> DataBank<'_> {
        DataBank {
            crate_id: 8,
            tag: 9801,
            offset: 0,
            words,
        }
    }

    #[test]
    fn test_count_is_masked_not_truncated() {
        let words = [0xFF12_3456, 0x0000_0001];
        let record = ScalerRecord::new(&words);
        assert_eq!(record.count(0), Some(0x12_3456));
        assert_eq!(record.count(1), Some(1));
        assert_eq!(record.count(2), None);
        assert_eq!(record.counts().collect::<Vec<_>>(), vec![0x12_3456, 1]);
    }

    #[test]
    fn test_reported_bits() {
        let words = [0x8000_0010];
        assert_eq!(
            ScalerRecord::new(&words).reported(),
            ReportedBits { quartet: true, helicity: false }
        );
        let words = [0x4000_0010];
        assert_eq!(
            ScalerRecord::new(&words).reported(),
            ReportedBits { quartet: false, helicity: true }
        );
        let words = [0xC000_0000];
        assert_eq!(
            ScalerRecord::new(&words).reported(),
            ReportedBits { quartet: true, helicity: true }
        );
    }

    #[test]
    fn test_record_count() {
        assert_eq!(record_count(0, 32), 0);
        assert_eq!(record_count(1, 32), 0);
        assert_eq!(record_count(33, 32), 1);
        assert_eq!(record_count(64, 32), 1);
        assert_eq!(record_count(65, 32), 2);
        assert_eq!(record_count(10, 0), 0);
    }

    #[test]
    fn test_records_skip_bank_header_and_partial_tail() {
        let words = [0xAAAA, 1, 2, 3, 4, 5, 6, 7];
        let split: Vec<Vec<u32>> = records(&bank(&words), 3)
            .map(|r| r.counts().collect())
            .collect();
        assert_eq!(split, vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn test_empty_bank_has_no_records() {
        assert_eq!(records(&bank(&[]), 32).count(), 0);
        assert_eq!(records(&bank(&[0x1]), 32).count(), 0);
    }
}
