//! # Helicity Scaler Library
//!
//! Decoding of beam-helicity scaler banks from raw DAQ events, recovery of the
//! true helicity of every helicity window from the delayed pseudo-random report,
//! and accumulation of helicity-sorted scaler counts into beam charge
//! asymmetries.
//!
//! ## Crate Structure
//!
//! - **`decode`**: bank scanner over raw event buffers and window record access.
//! - **`helicity`**: the 30-bit shift register, the helicity predictor with its
//!   delay strategies, and the quartet accumulator.
//! - **`pipeline`**: `HelicityScaler`, the per-run state the host feeds events to.
//! - **`summary`**: finalized run snapshots, JSON export and the end-of-run table.
//! - **`config`**: settings loading with `figment` and validation into a
//!   resolved scaler layout. See `config::Settings`.
//! - **`error`**: `DecodeError` and the crate-wide `HelicityError`.
//! - **`dump`**: a flat event dump format for offline replay.
//! - **`simulate`**: synthetic helicity scaler events.
//! - **`tracing_setup`**: `tracing-subscriber` initialisation.
//! - **`validation`**: small helpers backing configuration checks.

pub mod config;
pub mod decode;
pub mod dump;
pub mod error;
pub mod helicity;
pub mod pipeline;
pub mod simulate;
pub mod summary;
pub mod tracing_setup;
pub mod validation;

pub use config::{HelicityConfig, Settings};
pub use error::{DecodeError, HelicityError, HelicityResult};
pub use helicity::{DelayStrategy, Diagnostic, Helicity};
pub use pipeline::{Consumed, EventReport, HelicityScaler};
pub use summary::RunSummary;
