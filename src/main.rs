//! CLI Entry Point for helicity_daq
//!
//! Provides command-line interface for:
//! - Replaying a recorded event dump through the helicity scaler pipeline
//! - Generating a synthetic event dump for offline checks
//!
//! # Usage
//!
//! Replay a dump and print the charge asymmetry table:
//! ```bash
//! helicity_daq replay run_1234.dump --config config/helicity.toml
//! ```
//!
//! Generate 5000 quartets of synthetic events:
//! ```bash
//! helicity_daq simulate --config config/helicity.toml --output sim.dump --quartets 5000
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use helicity_daq::config::Settings;
use helicity_daq::dump;
use helicity_daq::pipeline::HelicityScaler;
use helicity_daq::simulate::{HelicitySimulator, SimulationOptions};
use helicity_daq::tracing_setup;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "helicity_daq")]
#[command(about = "Helicity scaler decoding and beam charge asymmetries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an event dump and print the run summary
    Replay {
        /// Event dump file
        dump: PathBuf,

        /// Settings file
        #[arg(long)]
        config: PathBuf,

        /// Print the summary as JSON instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Write a synthetic event dump
    Simulate {
        /// Settings file describing the readout
        #[arg(long)]
        config: PathBuf,

        /// Output dump file
        #[arg(long)]
        output: PathBuf,

        /// Number of helicity quartets to generate
        #[arg(long, default_value = "1000")]
        quartets: usize,

        /// Seed of the noise generator
        #[arg(long, default_value = "7")]
        seed: u64,

        /// Beam current
        #[arg(long, default_value = "50.0")]
        current: f64,

        /// Helicity-correlated charge asymmetry
        #[arg(long, default_value = "0.001")]
        asymmetry: f64,

        /// Probability that the beam is off for a quartet
        #[arg(long, default_value = "0.0")]
        beam_off: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { dump, config, json } => replay(&dump, &config, json),
        Commands::Simulate {
            config,
            output,
            quartets,
            seed,
            current,
            asymmetry,
            beam_off,
        } => {
            let options = SimulationOptions {
                rng_seed: seed,
                current,
                charge_asymmetry: asymmetry,
                beam_off_probability: beam_off,
                ..Default::default()
            };
            simulate(&config, &output, quartets, options)
        }
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    let settings = Settings::load_from(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    tracing_setup::init_from_settings(&settings).map_err(anyhow::Error::msg)?;
    Ok(settings)
}

fn replay(dump_path: &Path, config_path: &Path, json: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let events = dump::read_file(dump_path)
        .with_context(|| format!("Failed to read event dump {}", dump_path.display()))?;
    let mut scaler = HelicityScaler::new(settings.scaler).context("Invalid scaler configuration")?;

    info!(events = events.len(), dump = %dump_path.display(), "Replaying event dump");
    let mut rejected = 0usize;
    for (index, event) in events.iter().enumerate() {
        if let Err(err) = scaler.process(&event.words, event.event_type) {
            rejected += 1;
            warn!(index, error = %err, "Event rejected");
        }
    }

    let summary = scaler.end_run();
    if json {
        println!("{}", summary.to_json()?);
    } else {
        println!("{summary}");
    }
    if rejected > 0 {
        eprintln!("{rejected} of {} events rejected as malformed", events.len());
    }
    Ok(())
}

fn simulate(config_path: &Path, output: &Path, quartets: usize, options: SimulationOptions) -> Result<()> {
    let settings = load_settings(config_path)?;
    let mut simulator =
        HelicitySimulator::new(&settings.scaler, options).context("Invalid scaler configuration")?;

    let events = simulator.generate(quartets);
    dump::write_file(output, &events)
        .with_context(|| format!("Failed to write event dump {}", output.display()))?;
    println!("Wrote {} events ({quartets} quartets) to {}", events.len(), output.display());
    Ok(())
}
