//! Per-event helicity scaler pipeline.
//!
//! [`HelicityScaler`] owns the whole run state: the predictor, the accumulator,
//! the delayed-event queue and the diagnostic counters. The host hands it one
//! raw event at a time together with the event type:
//!
//! ```text
//! process(raw, type)
//!   ├─ delayed type  → copy into queue            → Deferred
//!   ├─ unknown type  →                            → Ignored
//!   └─ handled type  → scan banks → records
//!                        → predictor → accumulator → Processed(report)
//! end_run()
//!   └─ replay queue in arrival order → snapshot()
//! ```
//!
//! Every call is atomic: all banks of an event are scanned before any window
//! reaches the predictor, so a malformed event leaves the state untouched.

use crate::config::HelicityConfig;
use crate::decode::record::{record_count, MAX_RECORDS_PER_BANK};
use crate::decode::{records, scan, DataBank};
use crate::error::{DecodeError, HelicityResult};
use crate::helicity::{
    AccumulatedStats, Diagnostic, Helicity, HelicityPredictor, LfsrState, QuartetAccumulator,
};
use crate::summary::{DiagnosticCounters, RunSummary};
use chrono::Utc;
use tracing::{debug, info, trace, warn};

/// What one processed event contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventReport {
    /// Matching scaler banks found
    pub banks: usize,
    /// Window records fed to the predictor
    pub windows: usize,
    /// Windows emitted with positive helicity
    pub plus: usize,
    /// Windows emitted with negative helicity
    pub minus: usize,
    /// Windows emitted before the predictor was synchronized
    pub unknown: usize,
    /// Diagnostics raised while processing the event
    pub diagnostics: Vec<Diagnostic>,
}

/// Outcome of handing an event to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumed {
    /// Event type not handled
    Ignored,
    /// Queued for replay at run end
    Deferred,
    /// Event processed
    Processed(EventReport),
}

/// Helicity scaler pipeline for one run.
#[derive(Debug)]
pub struct HelicityScaler {
    config: HelicityConfig,
    predictor: HelicityPredictor,
    accumulator: QuartetAccumulator,
    delayed: Vec<Vec<u32>>,
    triggers: u64,
    diagnostics: DiagnosticCounters,
    counts: Vec<u32>,
}

impl HelicityScaler {
    /// Validate the configuration and start an empty run.
    pub fn new(config: HelicityConfig) -> HelicityResult<Self> {
        let layout = config.validate()?;
        info!(
            crate_id = config.crate_id,
            bank_tag = config.bank_tag,
            channels = layout.num_channels,
            bcms = layout.bcms.len(),
            strategy = ?config.delay_strategy,
            "Helicity scaler initialized"
        );
        Ok(Self {
            predictor: HelicityPredictor::new(config.delay_strategy),
            counts: Vec::with_capacity(layout.num_channels),
            accumulator: QuartetAccumulator::new(layout),
            delayed: Vec::new(),
            triggers: 0,
            diagnostics: DiagnosticCounters::default(),
            config,
        })
    }

    /// Configuration the run was started with.
    pub fn config(&self) -> &HelicityConfig {
        &self.config
    }

    /// Whether events of this type should be handed to [`process`](Self::process).
    pub fn is_my_event(&self, event_type: u32) -> bool {
        self.config.event_types.contains(&event_type) || self.is_delayed(event_type)
    }

    fn is_delayed(&self, event_type: u32) -> bool {
        self.config.delayed_types.contains(&event_type)
    }

    /// Process one raw event.
    ///
    /// A malformed event is rejected with [`DecodeError::MalformedBuffer`] and
    /// leaves the run state unchanged apart from the malformed-event counter.
    pub fn process(&mut self, raw_event: &[u32], event_type: u32) -> Result<Consumed, DecodeError> {
        if self.is_delayed(event_type) {
            self.delayed.push(raw_event.to_vec());
            trace!(event_type, queued = self.delayed.len(), "Deferred helicity scaler event");
            return Ok(Consumed::Deferred);
        }
        if !self.config.event_types.contains(&event_type) {
            return Ok(Consumed::Ignored);
        }
        self.process_event(raw_event).map(Consumed::Processed)
    }

    fn process_event(&mut self, raw_event: &[u32]) -> Result<EventReport, DecodeError> {
        let banks = scan(raw_event, self.config.crate_id, self.config.bank_tag)
            .collect::<Result<Vec<DataBank<'_>>, DecodeError>>()
            .map_err(|err| {
                self.diagnostics.malformed_events += 1;
                warn!(error = %err, "Rejecting malformed event");
                err
            })?;

        let mut report = EventReport {
            banks: banks.len(),
            ..Default::default()
        };
        let num_channels = self.config.num_channels;

        for bank in &banks {
            let nrecords = record_count(bank.words.len(), num_channels);
            trace!(offset = bank.offset, records = nrecords, "Helicity scaler bank");
            if nrecords > MAX_RECORDS_PER_BANK {
                warn!(records = nrecords, offset = bank.offset, "Beam off for too long");
            }

            for record in records(bank, num_channels) {
                self.counts.clear();
                self.counts.extend(record.counts());

                let output = self.predictor.observe(record.reported());
                self.triggers += 1;
                if let Some(diagnostic) = output.diagnostic {
                    self.count_diagnostic(diagnostic);
                    report.diagnostics.push(diagnostic);
                }

                match output.window.helicity {
                    Helicity::Plus => report.plus += 1,
                    Helicity::Minus => report.minus += 1,
                    Helicity::Unknown => report.unknown += 1,
                }
                report.windows += 1;
                self.accumulator.accumulate(output.window, &self.counts);
            }
        }

        debug!(
            banks = report.banks,
            windows = report.windows,
            plus = report.plus,
            minus = report.minus,
            "Processed helicity scaler event"
        );
        Ok(report)
    }

    fn count_diagnostic(&mut self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::Synchronized { .. } => self.diagnostics.synchronizations += 1,
            Diagnostic::PredictionMismatch { .. } => self.diagnostics.prediction_mismatches += 1,
            Diagnostic::DesyncDetected { .. } => {
                self.diagnostics.desyncs += 1;
                self.accumulator.reset_quartet();
            }
        }
    }

    /// Replay the delayed events in arrival order, then finalize the run.
    ///
    /// Replay failures are logged and counted; they do not stop the replay.
    pub fn end_run(&mut self) -> RunSummary {
        let delayed = std::mem::take(&mut self.delayed);
        info!(count = delayed.len(), "Analyzing delayed helicity scaler events");

        for (index, event) in delayed.iter().enumerate() {
            match self.process_event(event) {
                Ok(_) => self.diagnostics.delayed_replayed += 1,
                Err(err) => warn!(index, error = %err, "Delayed event replay failed"),
            }
        }

        let summary = self.snapshot();
        info!(
            triggers = summary.totals.triggers,
            total_time = summary.totals.total_time,
            beam_on_time = summary.totals.beam_on_time,
            "Helicity scaler run finished"
        );
        summary
    }

    /// Finalized view of the run so far; the delayed queue is left alone.
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            finished_at: Utc::now(),
            channels: self.accumulator.channel_summaries(),
            bcms: self.accumulator.bcm_summaries(),
            totals: self.accumulator.time_summary(self.triggers),
            diagnostics: self.diagnostics,
        }
    }

    /// Predictor bookkeeping.
    pub fn predictor_state(&self) -> &LfsrState {
        self.predictor.state()
    }

    /// Raw accumulated sums.
    pub fn stats(&self) -> &AccumulatedStats {
        self.accumulator.stats()
    }

    /// Diagnostic counters so far.
    pub fn diagnostics(&self) -> DiagnosticCounters {
        self.diagnostics
    }

    /// Events waiting for the run-end replay.
    pub fn pending_delayed(&self) -> usize {
        self.delayed.len()
    }

    /// Windows seen so far.
    pub fn triggers(&self) -> u64 {
        self.triggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helicity::DelayStrategy;
    use crate::simulate::{build_event, helicity_bank_words, CrateBank};
    use tracing_test::traced_test;

    fn config() -> HelicityConfig {
        HelicityConfig::with_strategy(DelayStrategy::Immediate).with_bcm("BCM1", 2.0, 100.0)
    }

    /// Event with one helicity bank holding `windows` records.
    fn event(windows: &[[u32; 32]]) -> Vec<u32> {
        let records: Vec<Vec<u32>> = windows.iter().map(|w| w.to_vec()).collect();
        build_event(1, &[CrateBank::new(8).data_bank(9801, &helicity_bank_words(&records))])
    }

    fn window(quartet: bool, helicity: bool) -> [u32; 32] {
        let mut words = [0u32; 32];
        words[0] = 500 | (u32::from(quartet) << 31) | (u32::from(helicity) << 30);
        words[8] = 1_000_000;
        words
    }

    #[test]
    fn test_event_type_routing() {
        let mut scaler = HelicityScaler::new(config()).unwrap();
        assert!(scaler.is_my_event(1));
        assert!(scaler.is_my_event(129));
        assert!(!scaler.is_my_event(3));

        let raw = event(&[window(false, true)]);
        assert_eq!(scaler.process(&raw, 3).unwrap(), Consumed::Ignored);
        assert_eq!(scaler.process(&raw, 129).unwrap(), Consumed::Deferred);
        assert_eq!(scaler.pending_delayed(), 1);
        assert_eq!(scaler.triggers(), 0);

        match scaler.process(&raw, 1).unwrap() {
            Consumed::Processed(report) => {
                assert_eq!(report.banks, 1);
                assert_eq!(report.windows, 1);
                assert_eq!(report.unknown, 1);
            }
            other => panic!("expected Processed, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_configuration_is_fatal() {
        let config = HelicityConfig::with_strategy(DelayStrategy::Delay9).with_bcm("BCM99", 1.0, 0.0);
        assert!(HelicityScaler::new(config).is_err());
    }

    #[test]
    #[traced_test]
    fn test_malformed_event_leaves_state_untouched() {
        let mut scaler = HelicityScaler::new(config()).unwrap();
        let mut raw = event(&[window(true, true), window(false, false)]);
        scaler.process(&raw, 1).unwrap();
        let before = *scaler.predictor_state();
        let stats_before = scaler.stats().clone();

        // Second bank with a length running past the event end
        raw = event(&[window(false, true)]);
        raw.extend([40, (9801 << 16) | 0x0100]);
        raw[0] += 2;
        raw[2] += 2;

        assert!(scaler.process(&raw, 1).is_err());
        assert_eq!(*scaler.predictor_state(), before);
        assert_eq!(*scaler.stats(), stats_before);
        assert_eq!(scaler.diagnostics().malformed_events, 1);
        assert!(logs_contain("Rejecting malformed event"));
    }

    #[test]
    #[traced_test]
    fn test_oversized_bank_warns() {
        let mut scaler = HelicityScaler::new(config()).unwrap();
        let windows = vec![window(false, false); MAX_RECORDS_PER_BANK + 1];
        let report = match scaler.process(&event(&windows), 1).unwrap() {
            Consumed::Processed(report) => report,
            other => panic!("expected Processed, got {other:?}"),
        };
        assert_eq!(report.windows, MAX_RECORDS_PER_BANK + 1);
        assert!(logs_contain("Beam off for too long"));
    }

    #[test]
    fn test_delayed_events_replay_in_order() {
        let mut scaler = HelicityScaler::new(config()).unwrap();
        // Flag first, then the following window: replay order decides the first cycle
        scaler.process(&event(&[window(true, true)]), 129).unwrap();
        scaler.process(&event(&[window(false, true)]), 129).unwrap();
        scaler.process(&[5, 1, 2], 129).unwrap();

        let summary = scaler.end_run();
        assert_eq!(scaler.pending_delayed(), 0);
        assert_eq!(summary.diagnostics.delayed_replayed, 2);
        assert_eq!(summary.diagnostics.malformed_events, 1);
        assert_eq!(summary.totals.triggers, 2);
        // Flagged window closes a quartet, the next one opens the following quartet
        assert_eq!(scaler.predictor_state().first_cycle, Some(-2));
        assert_eq!(scaler.predictor_state().bits_collected, 2);
    }

    #[test]
    fn test_snapshot_does_not_drain_queue() {
        let mut scaler = HelicityScaler::new(config()).unwrap();
        scaler.process(&event(&[window(true, true)]), 129).unwrap();
        let summary = scaler.snapshot();
        assert_eq!(summary.totals.triggers, 0);
        assert_eq!(scaler.pending_delayed(), 1);
        assert_eq!(summary.bcms[0].asymmetry_mean, -100.0);
    }
}
