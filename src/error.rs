//! Custom error types for the helicity scaler pipeline.
//!
//! Two error enums cover the crate, both built with `thiserror`:
//!
//! - **`DecodeError`**: per-event failures of the bank scanner. A malformed
//!   event is rejected as a whole and leaves the pipeline state untouched, so
//!   the host can log it and move on to the next event.
//! - **`HelicityError`**: everything else. Configuration problems are fatal at
//!   construction time (the host must refuse to start the run); file and
//!   environment loading errors are wrapped with `#[from]` so `?` works across
//!   the configuration and dump layers.
//!
//! Prediction mismatches and desynchronization are *not* errors. They are
//! reported as [`crate::helicity::Diagnostic`] values and processing continues.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type HelicityResult<T> = std::result::Result<T, HelicityError>;

/// Failure to decode a single raw event buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A length or header word is inconsistent with the buffer it lives in.
    #[error("Malformed buffer at word {offset}: {reason}")]
    MalformedBuffer {
        /// Word offset of the offending length or header word.
        offset: usize,
        /// Human-readable description of the inconsistency.
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        DecodeError::MalformedBuffer {
            offset,
            reason: reason.into(),
        }
    }
}

/// Top-level error type of the crate.
#[derive(Error, Debug)]
pub enum HelicityError {
    /// Settings file or environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Settings loaded but describe an unusable readout.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A raw event could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An event dump is truncated or inconsistent.
    #[error("Event dump error at byte {offset}: {reason}")]
    Dump {
        /// Byte offset of the offending record.
        offset: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The run summary could not be serialized.
    #[error("Summary serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HelicityError {
    /// Whether the pipeline can keep going after this error.
    ///
    /// Decode failures only cost the current event; everything else stops the run.
    pub fn can_recover(&self) -> bool {
        matches!(self, HelicityError::Decode(_))
    }
}
