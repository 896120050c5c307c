//! Criterion benchmarks for the helicity scaler hot paths.
//!
//! Key metrics:
//! - Bank scanning throughput over events with several crates
//! - Predictor cost per window
//! - Full per-event pipeline cost
//!
//! Run with: cargo bench --bench helicity_decode

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use helicity_daq::config::HelicityConfig;
use helicity_daq::decode::{records, scan};
use helicity_daq::helicity::{DelayStrategy, HelicityPredictor};
use helicity_daq::pipeline::HelicityScaler;
use helicity_daq::simulate::{build_event, CrateBank, HelicitySimulator, SimulationOptions};

fn config() -> HelicityConfig {
    HelicityConfig::with_strategy(DelayStrategy::Delay9)
        .with_bcm("BCM1", 5263.0, 250_000.0)
        .with_bcm("BCM2", 5425.0, 250_000.0)
        .with_bcm("BCM4A", 5472.0, 250_000.0)
}

fn simulator(windows_per_event: usize) -> HelicitySimulator {
    let options = SimulationOptions {
        windows_per_event,
        ..Default::default()
    };
    HelicitySimulator::new(&config(), options).unwrap()
}

/// Scan events where the helicity bank sits behind other crates.
fn bank_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("bank_scan");

    for windows in [4usize, 32, 100] {
        let raw = simulator(windows).next_event();
        // Re-wrap the helicity bank payload behind filler crates
        let filler: Vec<u32> = (0..256).collect();
        let payload = &raw[6..];
        let mut crates: Vec<CrateBank> = (1..8)
            .map(|id| CrateBank::new(id).data_bank(1, &filler))
            .collect();
        crates.push(CrateBank::new(8).data_bank(9801, payload));
        let event = build_event(1, &crates);

        group.throughput(Throughput::Bytes((event.len() * 4) as u64));
        group.bench_with_input(BenchmarkId::new("scan", windows), &event, |b, event| {
            b.iter(|| {
                let mut words = 0usize;
                for bank in scan(black_box(event), 8, 9801) {
                    words += bank.unwrap().words.len();
                }
                words
            });
        });
    }

    group.finish();
}

/// Predictor cost per window on a synchronized stream.
fn predictor_observe(c: &mut Criterion) {
    let raw = simulator(4096).next_event();
    let bank = scan(&raw, 8, 9801).next().unwrap().unwrap();
    let reported: Vec<_> = records(&bank, 32).map(|r| r.reported()).collect();

    let mut group = c.benchmark_group("predictor");
    group.throughput(Throughput::Elements(reported.len() as u64));
    group.bench_function("observe", |b| {
        b.iter(|| {
            let mut predictor = HelicityPredictor::new(DelayStrategy::Delay9);
            for bits in &reported {
                black_box(predictor.observe(*bits));
            }
        });
    });
    group.finish();
}

/// Full pipeline: scan, predict and accumulate.
fn pipeline_process(c: &mut Criterion) {
    let mut sim = simulator(32);
    let events: Vec<Vec<u32>> = (0..64).map(|_| sim.next_event()).collect();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements((events.len() * 32) as u64));
    group.bench_function("process", |b| {
        b.iter(|| {
            let mut scaler = HelicityScaler::new(config()).unwrap();
            for event in &events {
                black_box(scaler.process(event, 1).unwrap());
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bank_scan, predictor_observe, pipeline_process);
criterion_main!(benches);
