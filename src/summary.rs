//! Run summary snapshots.
//!
//! A [`RunSummary`] is a read-only copy of the finalized run totals. It
//! serializes to JSON for export and renders the end-of-run charge asymmetry
//! table through `Display`.

use crate::error::HelicityResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Helicity-sorted totals of one scaler channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelSummary {
    /// Channel index within a record
    pub channel: usize,
    /// Counts in positive helicity windows
    pub plus: f64,
    /// Counts in negative helicity windows
    pub minus: f64,
    /// Counts in all windows with known helicity
    pub sum: f64,
    /// `(plus - minus) / sum`
    pub asymmetry: f64,
    /// Binomial error of `asymmetry`
    pub asymmetry_error: f64,
}

/// Charge totals and asymmetries of one BCM.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BcmSummary {
    /// Configured name
    pub name: String,
    /// Scaler channel, `None` when the BCM is excluded from accumulation
    pub channel: Option<usize>,
    /// Helicity-gated charge from the summed plus and minus counts
    pub charge: f64,
    /// Charge asymmetry from the summed plus and minus counts
    pub charge_asymmetry: f64,
    /// Charge of the accepted quartets
    pub beam_on_charge: f64,
    /// Mean quartet asymmetry, `-100` with fewer than two quartets
    pub asymmetry_mean: f64,
    /// Error on `asymmetry_mean`
    pub asymmetry_error: f64,
    /// Accepted quartets
    pub quartets: u64,
}

/// Time and trigger totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSummary {
    /// Helicity-gated time from the clock channel, seconds
    pub total_time: f64,
    /// Clock asymmetry between plus and minus windows
    pub time_asymmetry: f64,
    /// Time of the accepted quartets, seconds
    pub beam_on_time: f64,
    /// Every window seen, including those of unknown helicity
    pub triggers: u64,
    /// Windows with positive helicity
    pub triggers_plus: u64,
    /// Windows with negative helicity
    pub triggers_minus: u64,
    /// `(plus - minus) / (plus + minus)` over the trigger counts
    pub trigger_asymmetry: f64,
}

/// Diagnostics raised over the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticCounters {
    /// Times the predictor completed its seed
    pub synchronizations: u64,
    /// Reported bits that disagreed with the register
    pub prediction_mismatches: u64,
    /// Missing quartet flags
    pub desyncs: u64,
    /// Events rejected as malformed
    pub malformed_events: u64,
    /// Delayed events replayed at run end
    pub delayed_replayed: u64,
}

/// Finalized view of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// When the snapshot was taken
    pub finished_at: DateTime<Utc>,
    /// Per scaler channel
    pub channels: Vec<ChannelSummary>,
    /// Per configured BCM
    pub bcms: Vec<BcmSummary>,
    /// Time and trigger totals
    pub totals: TimeSummary,
    /// Diagnostic counters
    pub diagnostics: DiagnosticCounters,
}

impl RunSummary {
    /// Summary entry of a BCM by name.
    pub fn bcm(&self, name: &str) -> Option<&BcmSummary> {
        self.bcms.iter().find(|bcm| bcm.name == name)
    }

    /// Pretty-printed JSON export.
    pub fn to_json(&self) -> HelicityResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

const RULE: &str = "---------------------------------------------------------------------";

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---------------------- Beam Charge Asymmetries ----------------------")?;
        writeln!(f, "  BCM        Total     Charge        Beam ON     Beam ON      Asymmetry")?;
        writeln!(f, " Name       Charge    Asymmetry       Charge    Asymmetry        Error")?;
        for bcm in self.bcms.iter().filter(|bcm| bcm.channel.is_some()) {
            writeln!(
                f,
                "{:>6} {:12.2} {:12.8} {:12.2} {:12.8} {:12.8}",
                bcm.name,
                bcm.charge,
                bcm.charge_asymmetry,
                bcm.beam_on_charge,
                bcm.asymmetry_mean,
                bcm.asymmetry_error
            )?;
        }
        let totals = &self.totals;
        writeln!(
            f,
            "TIME(s){:12.2} {:12.8} {:12.2}",
            totals.total_time, totals.time_asymmetry, totals.beam_on_time
        )?;
        writeln!(
            f,
            "TRIGGERS {} (+{} / -{}), asymmetry {:.8}",
            totals.triggers, totals.triggers_plus, totals.triggers_minus, totals.trigger_asymmetry
        )?;
        let diag = &self.diagnostics;
        if diag.prediction_mismatches + diag.desyncs + diag.malformed_events > 0 {
            writeln!(
                f,
                "DIAGNOSTICS mismatches {} desyncs {} malformed events {}",
                diag.prediction_mismatches, diag.desyncs, diag.malformed_events
            )?;
        }
        write!(f, "{RULE}")
    }
}
