//! Helicity-sorted scaler sums and quartet charge asymmetries.
//!
//! Every window with a known helicity adds its counts to the plus or minus sums.
//! Independently, the accumulator collects the charge seen by each BCM in the
//! four windows of a quartet. A window only counts towards its quartet when the
//! beam current is above threshold *and* every earlier window of the same
//! quartet also passed; when the fourth window passes, the quartet asymmetry
//! `h * ((q0 + q3) - (q1 + q2)) / (q0 + q1 + q2 + q3)` is folded into running
//! moments.

use super::{Helicity, HelicityWindow};
use crate::config::ScalerLayout;
use crate::summary::{BcmSummary, ChannelSummary, TimeSummary};
use serde::Serialize;
use tracing::{debug, warn};

/// Reported mean of a quartet asymmetry with fewer than two quartets.
pub const INSUFFICIENT_STATISTICS: f64 = -100.0;

/// Helicity-sorted sums of one scaler channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelSums {
    /// Counts in positive helicity windows
    pub plus: f64,
    /// Counts in negative helicity windows
    pub minus: f64,
    /// Counts in all windows with known helicity
    pub sum: f64,
}

/// Running quartet asymmetry moments of one BCM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BcmMoments {
    /// Charge of all accepted quartets
    pub charge_sum: f64,
    /// Sum of quartet asymmetries
    pub asymmetry_sum: f64,
    /// Sum of squared quartet asymmetries
    pub asymmetry_sum_sq: f64,
    /// Accepted quartets
    pub asymmetry_count: u64,
}

/// Run totals owned by the accumulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccumulatedStats {
    /// Per scaler channel
    pub channels: Vec<ChannelSums>,
    /// Per configured BCM
    pub bcms: Vec<BcmMoments>,
    /// Windows with positive helicity
    pub triggers_plus: u64,
    /// Windows with negative helicity
    pub triggers_minus: u64,
    /// Time of all accepted quartets, seconds
    pub time_sum: f64,
}

/// Scratch state of the quartet being filled.
#[derive(Debug, Clone, Default)]
struct QuartetBuffer {
    have_cycle: [bool; 4],
    time_cycle: [f64; 4],
    /// Indexed `[bcm][phase]`
    charge_cycle: Vec<[f64; 4]>,
}

/// Accumulates helicity-sorted counts and quartet charge asymmetries.
#[derive(Debug, Clone)]
pub struct QuartetAccumulator {
    layout: ScalerLayout,
    stats: AccumulatedStats,
    quartet: QuartetBuffer,
}

impl QuartetAccumulator {
    /// Empty accumulator for a validated layout.
    pub fn new(layout: ScalerLayout) -> Self {
        let stats = AccumulatedStats {
            channels: vec![ChannelSums::default(); layout.num_channels],
            bcms: vec![BcmMoments::default(); layout.bcms.len()],
            ..Default::default()
        };
        let quartet = QuartetBuffer {
            charge_cycle: vec![[0.0; 4]; layout.bcms.len()],
            ..Default::default()
        };
        Self {
            layout,
            stats,
            quartet,
        }
    }

    /// Totals accumulated so far.
    pub fn stats(&self) -> &AccumulatedStats {
        &self.stats
    }

    /// Layout the accumulator was built for.
    pub fn layout(&self) -> &ScalerLayout {
        &self.layout
    }

    /// Forget the partially filled quartet.
    pub fn reset_quartet(&mut self) {
        self.quartet.have_cycle = [false; 4];
    }

    /// Fold one window into the sums.
    ///
    /// `counts` are the masked channel counts of the window record, one per
    /// channel of the layout. Windows of unknown helicity, and records whose
    /// length does not match the layout, are ignored.
    pub fn accumulate(&mut self, window: HelicityWindow, counts: &[u32]) {
        if counts.len() != self.layout.num_channels {
            warn!(
                channels = counts.len(),
                expected = self.layout.num_channels,
                "Ignoring window with wrong channel count"
            );
            return;
        }
        let sign = match window.helicity {
            Helicity::Plus => {
                self.stats.triggers_plus += 1;
                1.0
            }
            Helicity::Minus => {
                self.stats.triggers_minus += 1;
                -1.0
            }
            Helicity::Unknown => return,
        };
        for (sums, &count) in self.stats.channels.iter_mut().zip(counts) {
            let count = f64::from(count);
            if sign > 0.0 {
                sums.plus += count;
            } else {
                sums.minus += count;
            }
            sums.sum += count;
        }

        let time = f64::from(counts[self.layout.clock_channel]) / self.layout.clock_frequency_hz;
        let current = self.threshold_current(counts, time);
        let phase = usize::from(window.phase % 4);

        if phase == 0 {
            self.quartet.have_cycle = [false; 4];
        }
        let chained = phase == 0 || self.quartet.have_cycle[phase - 1];
        if current >= self.layout.min_current && chained {
            self.quartet.have_cycle[phase] = true;
            self.quartet.time_cycle[phase] = time;
            for (bcm, cycle) in self.layout.bcms.iter().zip(self.quartet.charge_cycle.iter_mut()) {
                if let Some(channel) = bcm.channel {
                    cycle[phase] = (f64::from(counts[channel]) - time * bcm.offset) / bcm.gain;
                }
            }
        }

        if phase == 3 && self.quartet.have_cycle[3] {
            self.commit_quartet(sign);
        }
    }

    /// Calibrated current of the threshold BCM; zero when the window has no clock counts.
    fn threshold_current(&self, counts: &[u32], time: f64) -> f64 {
        let bcm = &self.layout.bcms[self.layout.threshold_bcm];
        match bcm.channel {
            Some(channel) if time > 0.0 => {
                (f64::from(counts[channel]) / time - bcm.offset) / bcm.gain
            }
            _ => 0.0,
        }
    }

    fn commit_quartet(&mut self, sign: f64) {
        let bcms = self
            .layout
            .bcms
            .iter()
            .zip(&self.quartet.charge_cycle)
            .zip(self.stats.bcms.iter_mut());
        for ((bcm, q), moments) in bcms {
            if bcm.channel.is_none() {
                continue;
            }
            let total = q[0] + q[1] + q[2] + q[3];
            let asy = sign * ((q[0] + q[3]) - (q[1] + q[2])) / total;
            if !asy.is_finite() {
                debug!(bcm = %bcm.name, total, "Skipping quartet with no charge");
                continue;
            }
            moments.charge_sum += total;
            moments.asymmetry_sum += asy;
            moments.asymmetry_sum_sq += asy * asy;
            moments.asymmetry_count += 1;
        }
        self.stats.time_sum += self.quartet.time_cycle.iter().sum::<f64>();
    }

    /// Per-channel sums and helicity asymmetries.
    pub fn channel_summaries(&self) -> Vec<ChannelSummary> {
        self.stats
            .channels
            .iter()
            .enumerate()
            .map(|(channel, sums)| {
                let (asymmetry, asymmetry_error) = channel_asymmetry(sums.plus, sums.minus, sums.sum);
                ChannelSummary {
                    channel,
                    plus: sums.plus,
                    minus: sums.minus,
                    sum: sums.sum,
                    asymmetry,
                    asymmetry_error,
                }
            })
            .collect()
    }

    /// Per-BCM helicity-gated charge and quartet asymmetry.
    pub fn bcm_summaries(&self) -> Vec<BcmSummary> {
        let clock = self.stats.channels[self.layout.clock_channel];
        let hz = self.layout.clock_frequency_hz;

        self.layout
            .bcms
            .iter()
            .zip(&self.stats.bcms)
            .map(|(bcm, moments)| {
                let (asymmetry_mean, asymmetry_error) = quartet_asymmetry(
                    moments.asymmetry_sum,
                    moments.asymmetry_sum_sq,
                    moments.asymmetry_count,
                );
                let (charge, charge_asymmetry) = match bcm.channel {
                    Some(channel) => {
                        let counts = self.stats.channels[channel];
                        let plus = (counts.plus - clock.plus / hz * bcm.offset) / bcm.gain;
                        let minus = (counts.minus - clock.minus / hz * bcm.offset) / bcm.gain;
                        let charge = plus + minus;
                        let asymmetry = if charge > 0.0 { (plus - minus) / charge } else { 0.0 };
                        (charge, asymmetry)
                    }
                    None => (0.0, 0.0),
                };
                BcmSummary {
                    name: bcm.name.clone(),
                    channel: bcm.channel,
                    charge,
                    charge_asymmetry,
                    beam_on_charge: moments.charge_sum,
                    asymmetry_mean,
                    asymmetry_error,
                    quartets: moments.asymmetry_count,
                }
            })
            .collect()
    }

    /// Helicity-gated time and trigger totals. `triggers` counts every window seen.
    pub fn time_summary(&self, triggers: u64) -> TimeSummary {
        let clock = self.stats.channels[self.layout.clock_channel];
        let clock_total = clock.plus + clock.minus;
        let plus = self.stats.triggers_plus;
        let minus = self.stats.triggers_minus;

        TimeSummary {
            total_time: clock_total / self.layout.clock_frequency_hz,
            time_asymmetry: if clock_total > 0.0 {
                (clock.plus - clock.minus) / clock_total
            } else {
                0.0
            },
            beam_on_time: self.stats.time_sum,
            triggers,
            triggers_plus: plus,
            triggers_minus: minus,
            trigger_asymmetry: if plus + minus > 0 {
                (plus as f64 - minus as f64) / (plus + minus) as f64
            } else {
                0.0
            },
        }
    }
}

/// Helicity asymmetry of a channel and its binomial error.
pub fn channel_asymmetry(plus: f64, minus: f64, sum: f64) -> (f64, f64) {
    if sum > 0.5 {
        let asymmetry = (plus - minus) / sum;
        let error = 2.0 * (plus * minus * sum).sqrt() / (sum * sum);
        (asymmetry, error)
    } else {
        (0.0, 0.0)
    }
}

/// Mean quartet asymmetry and the error on the mean.
///
/// Returns `(INSUFFICIENT_STATISTICS, 0.0)` with fewer than two quartets.
pub fn quartet_asymmetry(sum: f64, sum_sq: f64, count: u64) -> (f64, f64) {
    if count <= 1 {
        return (INSUFFICIENT_STATISTICS, 0.0);
    }
    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq - n * mean * mean).max(0.0);
    (mean, (variance / (n * (n - 1.0))).sqrt())
}
