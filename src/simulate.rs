//! Synthetic helicity scaler events.
//!
//! [`HelicitySimulator`] drives a helicity generator register, reports its bits
//! late the way the electronics do, and fills window records with BCM counts
//! for a beam whose current is modulated by the true helicity:
//!
//! ```text
//! current(h) = current * (1 + h * charge_asymmetry)
//! counts     = (current(h) * gain + offset) * window_seconds
//! ```
//!
//! The reporting delay follows the configured [`DelayStrategy`]: the counts of
//! a reported window belong to the beam window two quartets later
//! ([`DelayStrategy::Immediate`]) or nine windows later ([`DelayStrategy::Delay9`]).
//! A run replayed with the same strategy therefore measures a quartet charge
//! asymmetry of `charge_asymmetry`.
//!
//! The module also carries the small event builders used to wrap records into
//! crate and event banks.

use crate::config::{HelicityConfig, ScalerLayout};
use crate::decode::bank::{BANK_OF_BANKS, BANK_OF_INTEGERS};
use crate::decode::COUNT_MASK;
use crate::dump::DumpedEvent;
use crate::error::HelicityResult;
use crate::helicity::{lfsr_step, DelayStrategy, SEED_MASK};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const EVENT_HEADER_KIND: u32 = 0x10CC;

/// A crate (bank of banks) under construction.
#[derive(Debug, Clone)]
pub struct CrateBank {
    crate_id: u8,
    payload: Vec<u32>,
}

impl CrateBank {
    /// Empty crate bank.
    pub fn new(crate_id: u8) -> Self {
        Self {
            crate_id,
            payload: Vec::new(),
        }
    }

    /// Append an integer data bank.
    pub fn data_bank(mut self, tag: u16, data: &[u32]) -> Self {
        self.payload.push(data.len() as u32 + 1);
        self.payload.push((u32::from(tag) << 16) | BANK_OF_INTEGERS);
        self.payload.extend_from_slice(data);
        self
    }

    fn into_words(self) -> Vec<u32> {
        let mut words = Vec::with_capacity(self.payload.len() + 2);
        words.push(self.payload.len() as u32 + 1);
        words.push((u32::from(self.crate_id & 0xF) << 16) | BANK_OF_BANKS | 0x01);
        words.extend(self.payload);
        words
    }
}

/// Wrap crate banks into an event buffer.
pub fn build_event(event_type: u32, crates: &[CrateBank]) -> Vec<u32> {
    let payload: Vec<u32> = crates
        .iter()
        .cloned()
        .flat_map(CrateBank::into_words)
        .collect();
    let mut event = Vec::with_capacity(payload.len() + 2);
    event.push(payload.len() as u32 + 1);
    event.push(((event_type & 0xFFFF) << 16) | EVENT_HEADER_KIND);
    event.extend(payload);
    event
}

/// Payload of a helicity scaler bank: a bank-level header followed by the records.
pub fn helicity_bank_words(records: &[Vec<u32>]) -> Vec<u32> {
    let mut words = Vec::with_capacity(1 + records.iter().map(Vec::len).sum::<usize>());
    words.push(records.len() as u32);
    for record in records {
        words.extend_from_slice(record);
    }
    words
}

/// Beam and generator parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    /// Initial value of the generator register; zero is replaced by one
    pub lfsr_seed: u32,
    /// Beam current with the beam on
    pub current: f64,
    /// Helicity-correlated charge asymmetry of the beam
    pub charge_asymmetry: f64,
    /// Length of one helicity window, seconds
    pub window_seconds: f64,
    /// Window records per event
    pub windows_per_event: usize,
    /// Probability that the beam is off for a whole quartet
    pub beam_off_probability: f64,
    /// Seed of the noise generator
    pub rng_seed: u64,
    /// Event type of the generated events
    pub event_type: u32,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            lfsr_seed: 0x2AC3_5E71,
            current: 50.0,
            charge_asymmetry: 0.001,
            window_seconds: 1.0 / 30.0,
            windows_per_event: 8,
            beam_off_probability: 0.0,
            rng_seed: 7,
            event_type: 1,
        }
    }
}

/// Deterministic generator of helicity scaler events.
#[derive(Debug)]
pub struct HelicitySimulator {
    crate_id: u8,
    bank_tag: u16,
    layout: ScalerLayout,
    strategy: DelayStrategy,
    options: SimulationOptions,
    /// Register value of the quartet being reported
    register: u32,
    /// Beam state already drawn for the next beam quartet
    upcoming_beam: Option<bool>,
    rng: StdRng,
    /// Remaining records of the current quartet, last window first
    quartet: Vec<Vec<u32>>,
}

impl HelicitySimulator {
    /// Simulator for the readout described by `config`.
    pub fn new(config: &HelicityConfig, options: SimulationOptions) -> HelicityResult<Self> {
        let layout = config.validate()?;
        let register = match options.lfsr_seed & SEED_MASK {
            0 => 1,
            seed => seed,
        };
        Ok(Self {
            crate_id: config.crate_id,
            bank_tag: config.bank_tag,
            layout,
            strategy: config.delay_strategy,
            rng: StdRng::seed_from_u64(options.rng_seed),
            options,
            register,
            upcoming_beam: None,
            quartet: Vec::new(),
        })
    }

    fn draw_beam(&mut self) -> bool {
        !self.rng.gen_bool(self.options.beam_off_probability.clamp(0.0, 1.0))
    }

    /// Records of the next quartet.
    fn next_quartet(&mut self) -> Vec<Vec<u32>> {
        self.register = lfsr_step(self.register);
        let reported = self.register & 1 != 0;
        // The beam runs two quartets ahead of the report
        let ahead = lfsr_step(lfsr_step(self.register));

        // Beam quartet and phase measured in each reported window
        let (beam, windows) = match self.strategy {
            DelayStrategy::Immediate => {
                let beam_on = self.draw_beam();
                ([beam_on; 2], [(ahead, 0, 0), (ahead, 1, 0), (ahead, 2, 0), (ahead, 3, 0)])
            }
            DelayStrategy::Delay9 => {
                // One more window of delay reaches into the following beam quartet
                let beam_on = match self.upcoming_beam.take() {
                    Some(beam_on) => beam_on,
                    None => self.draw_beam(),
                };
                let following = self.draw_beam();
                self.upcoming_beam = Some(following);
                let after = lfsr_step(ahead);
                (
                    [beam_on, following],
                    [(ahead, 1, 0), (ahead, 2, 0), (ahead, 3, 0), (after, 0, 1)],
                )
            }
        };

        let mut quartet = Vec::with_capacity(4);
        for (phase, (beam_register, beam_phase, which)) in windows.into_iter().enumerate() {
            let beam_flip = beam_phase == 1 || beam_phase == 2;
            let helicity = if (beam_register & 1 != 0) != beam_flip { 1.0 } else { -1.0 };
            let mut record = self.window_counts(helicity, beam[which]);
            let flip = phase == 1 || phase == 2;
            record[0] |= u32::from(reported != flip) << 30;
            if phase == 3 {
                record[0] |= 1 << 31;
            }
            quartet.push(record);
        }
        quartet
    }

    fn window_counts(&mut self, helicity: f64, beam_on: bool) -> Vec<u32> {
        let seconds = self.options.window_seconds;
        let current = if beam_on {
            self.options.current * (1.0 + helicity * self.options.charge_asymmetry)
        } else {
            0.0
        };

        let mut record: Vec<u32> = (0..self.layout.num_channels)
            .map(|_| self.rng.gen_range(0..1000))
            .collect();
        record[self.layout.clock_channel] = (seconds * self.layout.clock_frequency_hz).round() as u32;
        for bcm in &self.layout.bcms {
            if let Some(channel) = bcm.channel {
                let expected = (current * bcm.gain + bcm.offset) * seconds;
                let jitter: f64 = self.rng.gen_range(-0.5..0.5);
                record[channel] = (expected + jitter).round().max(0.0) as u32;
            }
        }
        for word in &mut record {
            *word &= COUNT_MASK;
        }
        record
    }

    /// Raw event holding the next `windows_per_event` windows.
    pub fn next_event(&mut self) -> Vec<u32> {
        let windows = self.options.windows_per_event.max(1);
        let mut records = Vec::with_capacity(windows);
        while records.len() < windows {
            if self.quartet.is_empty() {
                let mut quartet = self.next_quartet();
                quartet.reverse();
                self.quartet = quartet;
            }
            if let Some(record) = self.quartet.pop() {
                records.push(record);
            }
        }
        let bank = CrateBank::new(self.crate_id).data_bank(self.bank_tag, &helicity_bank_words(&records));
        build_event(self.options.event_type, &[bank])
    }

    /// Generate at least `quartets` quartets worth of events.
    pub fn generate(&mut self, quartets: usize) -> Vec<DumpedEvent> {
        let windows = self.options.windows_per_event.max(1);
        let events = (quartets * 4).div_ceil(windows);
        debug!(quartets, events, "Generating helicity scaler events");
        (0..events)
            .map(|_| DumpedEvent::new(self.options.event_type, self.next_event()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{records, scan};
    use crate::helicity::Helicity;

    fn config() -> HelicityConfig {
        HelicityConfig::with_strategy(DelayStrategy::Immediate)
            .with_bcm("BCM1", 5263.0, 250_000.0)
            .with_bcm("BCM4A", 5472.0, 250_000.0)
    }

    #[test]
    fn test_build_event_nests_banks() {
        let raw = build_event(
            1,
            &[
                CrateBank::new(3).data_bank(9801, &[9, 9]),
                CrateBank::new(8).data_bank(7, &[1]).data_bank(9801, &[4, 5, 6]),
            ],
        );
        assert_eq!(raw[0] as usize, raw.len() - 1);
        assert_eq!(raw[1], 0x0001_10CC);
        let banks: Vec<Vec<u32>> = scan(&raw, 8, 9801).map(|b| b.unwrap().words.to_vec()).collect();
        assert_eq!(banks, vec![vec![4, 5, 6]]);
    }

    #[test]
    fn test_events_carry_requested_windows() {
        let options = SimulationOptions {
            windows_per_event: 6,
            ..Default::default()
        };
        let mut sim = HelicitySimulator::new(&config(), options).unwrap();
        let raw = sim.next_event();
        let bank = scan(&raw, 8, 9801).next().unwrap().unwrap();
        let windows: Vec<_> = records(&bank, 32).collect();
        assert_eq!(windows.len(), 6);
        // Quartet flag on the fourth window only
        let flags: Vec<bool> = windows.iter().map(|w| w.reported().quartet).collect();
        assert_eq!(flags, vec![false, false, false, true, false, false]);
        assert_eq!(windows[0].count(8), Some(33_333));
    }

    #[test]
    fn test_reported_bits_follow_quartet_pattern() {
        let mut sim = HelicitySimulator::new(&config(), SimulationOptions::default()).unwrap();
        let raw = sim.next_event();
        let bank = scan(&raw, 8, 9801).next().unwrap().unwrap();
        let bits: Vec<bool> = records(&bank, 32).map(|w| w.reported().helicity).collect();
        for quartet in bits.chunks_exact(4) {
            assert_eq!(quartet, [quartet[0], !quartet[0], !quartet[0], quartet[0]]);
        }
    }

    #[test]
    fn test_beam_counts_follow_resolved_helicity() {
        let options = SimulationOptions {
            charge_asymmetry: 0.1,
            ..Default::default()
        };
        // BCM1 count of a window with the asymmetry switched off
        let baseline = (50.0 * 5263.0 + 250_000.0) / 30.0;

        for strategy in [DelayStrategy::Immediate, DelayStrategy::Delay9] {
            let config = HelicityConfig::with_strategy(strategy).with_bcm("BCM1", 5263.0, 250_000.0);
            let mut sim = HelicitySimulator::new(&config, options.clone()).unwrap();
            let raw = sim.next_event();
            let bank = scan(&raw, 8, 9801).next().unwrap().unwrap();

            let mut register = options.lfsr_seed;
            for (index, window) in records(&bank, 32).enumerate() {
                let phase = (index % 4) as u8;
                if phase == 0 {
                    register = lfsr_step(register);
                }
                let expected = strategy.resolve(register, phase).helicity;
                let above = f64::from(window.count(0).unwrap()) > baseline;
                assert_eq!(above, expected == Helicity::Plus, "{strategy:?} window {index}");
            }
        }
    }

    #[test]
    fn test_same_seed_same_events() {
        let mut a = HelicitySimulator::new(&config(), SimulationOptions::default()).unwrap();
        let mut b = HelicitySimulator::new(&config(), SimulationOptions::default()).unwrap();
        assert_eq!(a.generate(10), b.generate(10));
    }

    #[test]
    fn test_generate_rounds_up_to_whole_events() {
        let mut sim = HelicitySimulator::new(&config(), SimulationOptions::default()).unwrap();
        assert_eq!(sim.generate(3).len(), 2);
    }

    #[test]
    fn test_beam_off_quartets_have_no_current() {
        let options = SimulationOptions {
            beam_off_probability: 1.0,
            ..Default::default()
        };
        let mut sim = HelicitySimulator::new(&config(), options).unwrap();
        let raw = sim.next_event();
        let bank = scan(&raw, 8, 9801).next().unwrap().unwrap();
        for window in records(&bank, 32) {
            // Offset only: 250000 Hz over a thirtieth of a second
            let bcm1 = window.count(0).unwrap();
            assert!((8333..=8334).contains(&bcm1), "BCM1 count {bcm1}");
        }
    }
}
