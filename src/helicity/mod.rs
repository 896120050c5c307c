//! Helicity recovery and helicity-sorted scaler accumulation.
//!
//! - [`lfsr`]: the 30-bit shift register that generates the helicity sequence.
//! - [`predictor`]: tracks the reported bits, verifies them against the register
//!   and emits the delay-corrected helicity of each window.
//! - [`quartet`]: sorts scaler counts by helicity and folds complete quartets
//!   into charge asymmetry moments.

pub mod lfsr;
pub mod predictor;
pub mod quartet;

pub use lfsr::{lfsr_step, SEED_BITS, SEED_MASK};
pub use predictor::{HelicityPredictor, LfsrState};
pub use quartet::{AccumulatedStats, QuartetAccumulator};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Helicity sign of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Helicity {
    /// Positive helicity
    Plus,
    /// Negative helicity
    Minus,
    /// Predictor not synchronized yet
    Unknown,
}

impl Helicity {
    /// Sign from the low bit of a register value: set is positive.
    pub fn from_low_bit(value: u32) -> Self {
        if value & 1 != 0 {
            Helicity::Plus
        } else {
            Helicity::Minus
        }
    }

    /// `+1`, `-1` or `0`.
    pub fn signum(self) -> i32 {
        match self {
            Helicity::Plus => 1,
            Helicity::Minus => -1,
            Helicity::Unknown => 0,
        }
    }

    /// Opposite sign; `Unknown` stays unknown.
    pub fn flipped(self) -> Self {
        match self {
            Helicity::Plus => Helicity::Minus,
            Helicity::Minus => Helicity::Plus,
            Helicity::Unknown => Helicity::Unknown,
        }
    }

    /// Whether the sign is known.
    pub fn is_known(self) -> bool {
        self != Helicity::Unknown
    }
}

impl fmt::Display for Helicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Helicity::Plus => write!(f, "+"),
            Helicity::Minus => write!(f, "-"),
            Helicity::Unknown => write!(f, "0"),
        }
    }
}

/// Helicity emitted for one window together with its position in the quartet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelicityWindow {
    /// Delay-corrected helicity
    pub helicity: Helicity,
    /// Quartet phase (0..=3) the helicity belongs to
    pub phase: u8,
}

/// How the reported helicity is mapped to the helicity of the current window.
///
/// The electronics report the helicity with a delay relative to the beam. Both
/// strategies step the register twice ahead of the reported seed; they differ in
/// how the quartet phase lines up with the delayed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayStrategy {
    /// Nine-window reporting delay: the emitted quartet starts one window after
    /// the reported one.
    Delay9,
    /// Whole-quartet reporting delay: emitted and reported quartets line up.
    Immediate,
}

impl DelayStrategy {
    /// Helicity and emitted phase for a window at `phase` of the reported quartet.
    pub fn resolve(self, seed: u32, phase: u8) -> HelicityWindow {
        let mut actual = lfsr_step(lfsr_step(seed));
        match self {
            DelayStrategy::Delay9 => {
                let helicity = if phase == 3 {
                    actual = lfsr_step(actual);
                    Helicity::from_low_bit(actual)
                } else if phase <= 1 {
                    Helicity::from_low_bit(actual).flipped()
                } else {
                    Helicity::from_low_bit(actual)
                };
                HelicityWindow {
                    helicity,
                    phase: (phase + 1) % 4,
                }
            }
            DelayStrategy::Immediate => {
                let helicity = match phase {
                    1 | 2 => Helicity::from_low_bit(actual).flipped(),
                    _ => Helicity::from_low_bit(actual),
                };
                HelicityWindow { helicity, phase }
            }
        }
    }
}

/// Observational events raised while tracking the helicity sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Thirty bits collected; helicity is known from this window on.
    Synchronized {
        /// Window counter
        trigger: u64,
        /// Register value at synchronization
        seed: u32,
    },
    /// The register predicted a different bit than the one reported.
    PredictionMismatch {
        /// Window counter
        trigger: u64,
        /// Register after folding in the reported bit
        reported: u32,
        /// Register predicted from the previous value
        predicted: u32,
    },
    /// Quartet flag missing at the end of a quartet; predictor was reset.
    DesyncDetected {
        /// Window counter
        trigger: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helicity_sign_helpers() {
        assert_eq!(Helicity::from_low_bit(0b101), Helicity::Plus);
        assert_eq!(Helicity::from_low_bit(0b100), Helicity::Minus);
        assert_eq!(Helicity::Plus.signum(), 1);
        assert_eq!(Helicity::Minus.signum(), -1);
        assert_eq!(Helicity::Unknown.signum(), 0);
        assert_eq!(Helicity::Plus.flipped(), Helicity::Minus);
        assert_eq!(Helicity::Unknown.flipped(), Helicity::Unknown);
        assert!(!Helicity::Unknown.is_known());
    }

    #[test]
    fn test_delay9_phase_rules() {
        let seed = 0x1234_5678 & SEED_MASK;
        let two = lfsr_step(lfsr_step(seed));
        let three = lfsr_step(two);

        let w3 = DelayStrategy::Delay9.resolve(seed, 3);
        assert_eq!(w3.helicity, Helicity::from_low_bit(three));
        assert_eq!(w3.phase, 0);

        for phase in [0u8, 1] {
            let w = DelayStrategy::Delay9.resolve(seed, phase);
            assert_eq!(w.helicity, Helicity::from_low_bit(two).flipped());
            assert_eq!(w.phase, phase + 1);
        }

        let w2 = DelayStrategy::Delay9.resolve(seed, 2);
        assert_eq!(w2.helicity, Helicity::from_low_bit(two));
        assert_eq!(w2.phase, 3);
    }

    #[test]
    fn test_immediate_phase_rules() {
        let seed = 0x0ABC_DEF1;
        let two = lfsr_step(lfsr_step(seed));
        let base = Helicity::from_low_bit(two);
        let signs: Vec<_> = (0..4)
            .map(|phase| DelayStrategy::Immediate.resolve(seed, phase))
            .collect();
        assert_eq!(
            signs.iter().map(|w| w.helicity).collect::<Vec<_>>(),
            vec![base, base.flipped(), base.flipped(), base]
        );
        assert_eq!(signs.iter().map(|w| w.phase).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(serde_json::to_string(&DelayStrategy::Delay9).unwrap(), "\"delay9\"");
        assert_eq!(
            serde_json::from_str::<DelayStrategy>("\"immediate\"").unwrap(),
            DelayStrategy::Immediate
        );
    }
}
