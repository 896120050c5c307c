//! Helicity predictor.
//!
//! The helicity generator picks the sign of each quartet (`+ - - +` or `- + + -`)
//! from the low bit of a 30-bit shift register and reports it with a delay. The
//! predictor rebuilds the register from the reported bits:
//!
//! 1. **Unsynchronized**: waits for a window with the quartet flag, which marks
//!    the last window of a quartet. That fixes the quartet phase and supplies the
//!    first bit.
//! 2. **Collecting**: shifts in the reported bit of every phase-0 window until
//!    30 bits are known.
//! 3. **Synchronized**: keeps shifting in reported bits, checks each one against
//!    the register's own prediction, and checks that every phase-3 window carries
//!    the quartet flag. A missing flag drops back to unsynchronized.
//!
//! Once synchronized the delay-corrected helicity of every window is derived
//! from the register according to the configured [`DelayStrategy`].

use super::lfsr::{fold_bit, lfsr_step, SEED_BITS};
use super::{DelayStrategy, Diagnostic, Helicity, HelicityWindow};
use crate::decode::ReportedBits;
use serde::Serialize;
use tracing::{info, warn};

/// Shift register bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LfsrState {
    /// Register rebuilt from the reported bits
    pub seed: u32,
    /// Windows seen so far
    pub trigger_count: u64,
    /// Reported bits shifted into `seed`, saturating at 30
    pub bits_collected: u8,
    /// Window counter value of the first window of the reference quartet
    pub first_cycle: Option<i64>,
    /// Phase of the most recently emitted window
    pub quartet_phase: u8,
}

impl LfsrState {
    /// Whether all 30 register bits are known.
    pub fn is_synchronized(&self) -> bool {
        self.bits_collected >= SEED_BITS
    }
}

/// Result of feeding one window to the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorOutput {
    /// Emitted helicity and quartet phase
    pub window: HelicityWindow,
    /// Diagnostic raised by this window, if any
    pub diagnostic: Option<Diagnostic>,
}

/// Rebuilds the helicity register from reported bits and emits true helicities.
#[derive(Debug, Clone)]
pub struct HelicityPredictor {
    strategy: DelayStrategy,
    state: LfsrState,
}

impl HelicityPredictor {
    /// New, unsynchronized predictor.
    pub fn new(strategy: DelayStrategy) -> Self {
        Self {
            strategy,
            state: LfsrState::default(),
        }
    }

    /// Current register bookkeeping.
    pub fn state(&self) -> &LfsrState {
        &self.state
    }

    /// Delay strategy in use.
    pub fn strategy(&self) -> DelayStrategy {
        self.strategy
    }

    /// Feed the reported bits of the next window.
    pub fn observe(&mut self, reported: ReportedBits) -> PredictorOutput {
        self.state.trigger_count += 1;
        let trigger = self.state.trigger_count;
        let mut diagnostic = None;

        let phase = match self.state.first_cycle {
            Some(first) => {
                let phase = (trigger as i64 - first).rem_euclid(4) as u8;
                match phase {
                    0 => {
                        let predicted = lfsr_step(self.state.seed);
                        self.state.seed = fold_bit(self.state.seed, reported.helicity);
                        if self.state.is_synchronized() && predicted != self.state.seed {
                            warn!(
                                trigger,
                                reported = format_args!("{:030b}", self.state.seed),
                                predicted = format_args!("{:030b}", predicted),
                                "Helicity prediction failed"
                            );
                            diagnostic = Some(Diagnostic::PredictionMismatch {
                                trigger,
                                reported: self.state.seed,
                                predicted,
                            });
                        }
                        diagnostic = self.collect_bit().or(diagnostic);
                    }
                    3 if !reported.quartet => {
                        warn!(trigger, "Quartet bit expected but not set");
                        self.reset();
                        diagnostic = Some(Diagnostic::DesyncDetected { trigger });
                    }
                    _ => {}
                }
                phase
            }
            None if reported.quartet => {
                // The flagged window closes a quartet and carries that quartet's bit
                self.state.first_cycle = Some(trigger as i64 - 3);
                self.state.seed = fold_bit(self.state.seed, reported.helicity);
                diagnostic = self.collect_bit();
                3
            }
            None => 0,
        };

        let window = if self.state.is_synchronized() {
            self.strategy.resolve(self.state.seed, phase)
        } else {
            HelicityWindow {
                helicity: Helicity::Unknown,
                phase,
            }
        };
        self.state.quartet_phase = window.phase;

        PredictorOutput { window, diagnostic }
    }

    fn collect_bit(&mut self) -> Option<Diagnostic> {
        if self.state.bits_collected >= SEED_BITS {
            return None;
        }
        self.state.bits_collected += 1;
        if self.state.bits_collected < SEED_BITS {
            return None;
        }
        let trigger = self.state.trigger_count;
        info!(
            trigger,
            seed = format_args!("{:030b}", self.state.seed),
            "Helicity seed found"
        );
        Some(Diagnostic::Synchronized {
            trigger,
            seed: self.state.seed,
        })
    }

    fn reset(&mut self) {
        self.state.bits_collected = 0;
        self.state.seed = 0;
        self.state.first_cycle = None;
    }
}
