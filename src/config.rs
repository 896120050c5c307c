//! Configuration loading using Figment.
//!
//! Settings are loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `HELICITY_`, nested keys separated by `__`
//!    (e.g. `HELICITY_SCALER__MIN_CURRENT=3.0`)
//!
//! The raw [`HelicityConfig`] is validated once into a [`ScalerLayout`], which is
//! what the accumulator works from. Validation failures are fatal to starting a run.
//!
//! # Example
//! ```no_run
//! use helicity_daq::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load_from("config/helicity.toml")?;
//! let layout = settings.scaler.validate()?;
//! println!("{} BCMs configured", layout.bcms.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{HelicityError, HelicityResult};
use crate::helicity::DelayStrategy;
use crate::tracing_setup::OutputFormat;
use crate::validation::{is_in_range, is_not_empty, is_positive, is_usable_gain, is_valid_channel};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed mapping from BCM name to the scaler channel that counts it.
pub const BCM_SCALER_CHANNELS: [(&str, usize); 6] = [
    ("BCM1", 0),
    ("BCM2", 2),
    ("Unser", 6),
    ("BCM4A", 10),
    ("BCM4B", 4),
    ("BCM4C", 12),
];

/// Resolve a BCM name to its scaler channel. Unknown names have no channel.
pub fn bcm_channel(name: &str) -> Option<usize> {
    BCM_SCALER_CHANNELS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, channel)| *channel)
}

/// Top-level settings file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Helicity scaler settings
    pub scaler: HelicityConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: OutputFormat::default(),
        }
    }
}

/// Calibration of one beam-current monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BcmCalibration {
    /// BCM name, resolved through [`BCM_SCALER_CHANNELS`]
    pub name: String,
    /// Counts per second per unit of current
    pub gain: f64,
    /// Counts per second with no beam
    pub offset: f64,
}

impl BcmCalibration {
    /// Create a calibration entry
    pub fn new(name: &str, gain: f64, offset: f64) -> Self {
        Self {
            name: name.to_string(),
            gain,
            offset,
        }
    }
}

/// Helicity scaler configuration as supplied by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HelicityConfig {
    /// Readout crate (ROC) carrying the helicity scaler bank, 0-15
    #[serde(default = "default_crate_id")]
    pub crate_id: u8,
    /// Tag of the helicity scaler data bank
    #[serde(default = "default_bank_tag")]
    pub bank_tag: u16,
    /// Words per window record
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,
    /// Channel counting the reference clock
    #[serde(default = "default_clock_channel")]
    pub clock_channel: usize,
    /// Reference clock frequency in Hz
    #[serde(default = "default_clock_frequency")]
    pub clock_frequency_hz: f64,
    /// Minimum current for a window to enter a quartet charge asymmetry
    #[serde(default = "default_min_current")]
    pub min_current: f64,
    /// Index into `bcms` of the monitor used for the current threshold
    #[serde(default)]
    pub threshold_bcm: usize,
    /// Reporting-delay compensation; must be chosen explicitly
    pub delay_strategy: DelayStrategy,
    /// Event types handled by the scaler
    #[serde(default = "default_event_types")]
    pub event_types: Vec<u32>,
    /// Event types queued and replayed at run end
    #[serde(default = "default_delayed_types")]
    pub delayed_types: Vec<u32>,
    /// Keep BCMs with unknown names (excluded from accumulation) instead of failing
    #[serde(default)]
    pub allow_unmapped_bcms: bool,
    /// Per-BCM calibrations
    #[serde(default)]
    pub bcms: Vec<BcmCalibration>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_crate_id() -> u8 {
    8
}

fn default_bank_tag() -> u16 {
    9801
}

fn default_num_channels() -> usize {
    32
}

fn default_clock_channel() -> usize {
    8
}

fn default_clock_frequency() -> f64 {
    1_000_000.0
}

fn default_min_current() -> f64 {
    2.5
}

fn default_event_types() -> Vec<u32> {
    vec![1, 2, 4, 5, 6, 7]
}

fn default_delayed_types() -> Vec<u32> {
    vec![129]
}

/// A BCM after name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBcm {
    /// Configured name
    pub name: String,
    /// Calibration gain
    pub gain: f64,
    /// Calibration offset
    pub offset: f64,
    /// Scaler channel, `None` when the name is not in the table
    pub channel: Option<usize>,
}

/// Validated, resolved view of the configuration used by the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerLayout {
    /// Words per window record
    pub num_channels: usize,
    /// Clock channel
    pub clock_channel: usize,
    /// Clock frequency in Hz
    pub clock_frequency_hz: f64,
    /// Minimum current threshold
    pub min_current: f64,
    /// Index into `bcms` of the threshold monitor; always has a channel
    pub threshold_bcm: usize,
    /// Resolved monitors in configuration order
    pub bcms: Vec<ResolvedBcm>,
}

impl HelicityConfig {
    /// Configuration with every default and the given delay strategy.
    pub fn with_strategy(delay_strategy: DelayStrategy) -> Self {
        Self {
            crate_id: default_crate_id(),
            bank_tag: default_bank_tag(),
            num_channels: default_num_channels(),
            clock_channel: default_clock_channel(),
            clock_frequency_hz: default_clock_frequency(),
            min_current: default_min_current(),
            threshold_bcm: 0,
            delay_strategy,
            event_types: default_event_types(),
            delayed_types: default_delayed_types(),
            allow_unmapped_bcms: false,
            bcms: Vec::new(),
        }
    }

    /// Append a BCM calibration
    pub fn with_bcm(mut self, name: &str, gain: f64, offset: f64) -> Self {
        self.bcms.push(BcmCalibration::new(name, gain, offset));
        self
    }

    /// Validate the configuration and resolve BCM channels.
    pub fn validate(&self) -> HelicityResult<ScalerLayout> {
        let invalid = |what: &str, why: &str| HelicityError::Configuration(format!("{what}: {why}"));

        is_in_range(self.crate_id, 0..=15).map_err(|e| invalid("crate_id", e))?;
        if self.num_channels == 0 {
            return Err(invalid("num_channels", "must be greater than 0"));
        }
        is_valid_channel(self.clock_channel, self.num_channels)
            .map_err(|e| invalid("clock_channel", e))?;
        is_positive(self.clock_frequency_hz).map_err(|e| invalid("clock_frequency_hz", e))?;
        if !self.min_current.is_finite() {
            return Err(invalid("min_current", "must be a finite number"));
        }
        if self.bcms.is_empty() {
            return Err(invalid("bcms", "at least one BCM calibration is required"));
        }

        let mut bcms = Vec::with_capacity(self.bcms.len());
        for bcm in &self.bcms {
            is_not_empty(&bcm.name).map_err(|e| invalid("bcm name", e))?;
            is_usable_gain(bcm.gain).map_err(|e| invalid(&format!("{} gain", bcm.name), e))?;
            if !bcm.offset.is_finite() {
                return Err(invalid(&format!("{} offset", bcm.name), "must be a finite number"));
            }
            let channel = bcm_channel(&bcm.name);
            match channel {
                Some(channel) => is_valid_channel(channel, self.num_channels)
                    .map_err(|e| invalid(&format!("{} channel {channel}", bcm.name), e))?,
                None if self.allow_unmapped_bcms => {
                    tracing::warn!(bcm = %bcm.name, "Unknown BCM name, excluded from accumulation");
                }
                None => return Err(invalid(&bcm.name, "unknown BCM name")),
            }
            bcms.push(ResolvedBcm {
                name: bcm.name.clone(),
                gain: bcm.gain,
                offset: bcm.offset,
                channel,
            });
        }

        match bcms.get(self.threshold_bcm) {
            None => {
                return Err(invalid(
                    "threshold_bcm",
                    &format!("no calibration for BCM index {}", self.threshold_bcm),
                ))
            }
            Some(bcm) if bcm.channel.is_none() => {
                return Err(invalid(
                    "threshold_bcm",
                    &format!("{} has no scaler channel", bcm.name),
                ))
            }
            Some(_) => {}
        }

        Ok(ScalerLayout {
            num_channels: self.num_channels,
            clock_channel: self.clock_channel,
            clock_frequency_hz: self.clock_frequency_hz,
            min_current: self.min_current,
            threshold_bcm: self.threshold_bcm,
            bcms,
        })
    }
}

impl Settings {
    /// Load settings from a TOML file and `HELICITY_` environment variables
    pub fn load_from<P: AsRef<Path>>(path: P) -> HelicityResult<Self> {
        let settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("HELICITY_").split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string, without environment overrides
    pub fn from_toml_str(toml: &str) -> HelicityResult<Self> {
        Ok(Figment::from(Toml::string(toml)).extract()?)
    }
}
