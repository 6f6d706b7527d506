mod batch;
mod catalog;
mod collector;
mod config;
mod counter;
mod credential;
mod planner;
mod script;
mod submit;
mod template;

use clap::Parser;
use config::JobConfig;
use credential::ProxySession;
use planner::Planner;
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Batch job submission helper: partitions dataset files into batches,
/// instantiates per-step CMSSW configs from templates and submits one
/// SLURM job array per dataset.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// datasets to submit, as named in the job configuration
    datasets: Vec<String>,

    /// directory holding jobs.yaml and the step config templates
    #[arg(short, long)]
    config_dir: PathBuf,

    /// input files per batch job
    #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    files_per_job: u64,

    /// submit every dataset defined in the configuration
    #[arg(short, long)]
    all: bool,

    /// enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// generate configs and the submission script without calling the scheduler
    #[arg(short = 'n', long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if cli.debug { "debug" } else { "info" })
        }))
        .init();

    if !cli.config_dir.is_dir() {
        error!(
            "Config directory not found: {}",
            cli.config_dir.display()
        );
        return ExitCode::FAILURE;
    }

    let config = match JobConfig::load(&cli.config_dir) {
        Ok(config) => config,
        Err(error) => {
            error!("Failed to load the job configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    let requested: Vec<String> = if cli.all {
        config.datasets.keys().cloned().collect()
    } else {
        cli.datasets.clone()
    };
    if requested.is_empty() {
        warn!("No datasets requested, nothing to do (pass dataset names or --all)");
        return ExitCode::SUCCESS;
    }

    let planner = match Planner::load(config, cli.files_per_job as usize, cli.dry_run) {
        Ok(planner) => planner,
        Err(error) => {
            error!("Failed to prepare the batch planner: {error}");
            return ExitCode::FAILURE;
        }
    };

    // datasets are processed strictly in the requested order; unknown names
    // are skipped inside the planner, everything else is fatal
    let mut proxy = ProxySession::new();
    for dataset in requested.iter() {
        if let Err(error) = planner.submit_dataset(dataset, &mut proxy) {
            error!(dataset = %dataset, "Aborting run: {error}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
