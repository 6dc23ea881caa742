//! Command-line front end
//!
//! ```text
//! lowfield-sim simulate --dataset bids/ --masks raw/ --seed 7
//! lowfield-sim measure --dataset bids/ --masks raw/ --derivative
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lowfield_sim::config::{FailurePolicy, SimulationConfig};
use lowfield_sim::layout::{DatasetLayout, MaskLayout};
use lowfield_sim::pipeline::Pipeline;
use lowfield_sim::{Modality, Result};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Simulate low-field MRI scans from a high-field BIDS dataset")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct DatasetArgs {
    /// Root of the BIDS dataset
    #[clap(long)]
    dataset: PathBuf,

    /// Root of the ROI masks
    #[clap(long)]
    masks: PathBuf,

    /// How mask files are laid out under --masks
    #[clap(long, value_enum, default_value = "raw")]
    mask_layout: MaskLayoutArg,

    /// JSON configuration file
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write low-field derivatives for the selected cohort
    Simulate {
        #[clap(flatten)]
        dataset: DatasetArgs,

        /// Base seed, overrides the configuration
        #[clap(long)]
        seed: Option<u64>,

        /// Stop at the first failing subject
        #[clap(long)]
        abort_on_error: bool,
    },
    /// Print ROI mean, std and SNR for each subject and modality
    Measure {
        #[clap(flatten)]
        dataset: DatasetArgs,

        /// Measure the simulated derivatives instead of the native scans
        #[clap(long)]
        derivative: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MaskLayoutArg {
    Raw,
    Bids,
}

impl DatasetArgs {
    fn pipeline(&self, configure: impl FnOnce(&mut SimulationConfig)) -> Result<Pipeline> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_file(path)?,
            None => SimulationConfig::default(),
        };
        configure(&mut config);
        config.validate()?;

        let masks = match self.mask_layout {
            MaskLayoutArg::Raw => MaskLayout::Raw(self.masks.clone()),
            MaskLayoutArg::Bids => MaskLayout::Bids(self.masks.clone()),
        };
        Ok(Pipeline::new(DatasetLayout::new(&self.dataset), masks, config))
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Returns the number of failed subjects
fn run(command: Command) -> Result<usize> {
    match command {
        Command::Simulate {
            dataset,
            seed,
            abort_on_error,
        } => {
            let pipeline = dataset.pipeline(|config| {
                if let Some(seed) = seed {
                    config.seed = seed;
                }
                if abort_on_error {
                    config.failure_policy = FailurePolicy::Abort;
                }
            })?;
            let report = pipeline.run_simulation()?;
            for e in &report.failed {
                error!("{}", e);
            }
            Ok(report.failed.len())
        }
        Command::Measure { dataset, derivative } => {
            let pipeline = dataset.pipeline(|_| {})?;
            let report = pipeline.measure_cohort(derivative)?;
            for subject in &report.completed {
                for modality in Modality::ALL {
                    let m = subject.measurements.get(modality);
                    println!(
                        "{}\t{}\tmean={:.2}\tstd={:.2}\tsnr={:.2}",
                        subject.subject, modality, m.mean, m.std, m.snr
                    );
                }
            }
            for e in &report.failed {
                error!("{}", e);
            }
            Ok(report.failed.len())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli.command) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "some subjects failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
