//! Raw event decoding: bank scanning and window record extraction.
pub mod bank;
pub mod record;

pub use bank::{scan, BankScanner, DataBank};
pub use record::{records, ReportedBits, ScalerRecord, COUNT_MASK};
