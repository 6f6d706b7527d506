use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs::File, path::{Path, PathBuf}};
use thiserror::Error;
use tracing::error;

/// file name of the job configuration inside the config directory
pub const JOB_CONFIG_NAME: &str = "jobs.yaml";
/// counter file inside the work directory
pub const COUNTER_FILE_NAME: &str = ".jobcounter";

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read the job configuration")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse the job configuration")]
    Parse(#[from] serde_yaml::Error),
    #[error("Preflight checks failed")]
    PreflightFailed,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct JobConfig {
    /// checked-out CMSSW release directory the jobs run in
    pub cmssw_release: PathBuf,
    /// ordered processing chain; step i>0 consumes the output of step i-1
    pub steps: Vec<StepSpec>,
    /// dataset name -> locator (catalog name or local directory)
    pub datasets: BTreeMap<String, String>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub name: String,
    /// config template path, relative paths resolve against the config directory
    pub config: PathBuf,
}

impl JobConfig {
    /// Load and validate `<config_dir>/jobs.yaml`. Any preflight failure is
    /// fatal before processing starts.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(config_dir.join(JOB_CONFIG_NAME))?;
        let mut config: JobConfig = serde_yaml::from_reader(file)?;

        for step in config.steps.iter_mut() {
            if step.config.is_relative() {
                step.config = config_dir.join(&step.config);
            }
        }
        if config.work_dir.is_relative() {
            config.work_dir = config_dir.join(&config.work_dir);
        }

        if config.preflight_checks() {
            Err(ConfigErrors::PreflightFailed)
        } else {
            Ok(config)
        }
    }

    pub fn counter_path(&self) -> PathBuf {
        self.work_dir.join(COUNTER_FILE_NAME)
    }

    /// Returns true when any check failed. All problems are reported at once
    /// instead of piece-by-piece to make fixing a config less tedious.
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if !self.cmssw_release.is_dir() {
            error!(
                "cmsswRelease is not a directory: {}",
                self.cmssw_release.display()
            );
            contains_error = true;
        }

        if self.steps.is_empty() {
            error!("No steps defined, nothing to generate configs for");
            contains_error = true;
        }

        for step in self.steps.iter() {
            if !step.config.is_file() {
                error!(
                    "steps.{}.config not found at {}",
                    step.name,
                    step.config.display()
                );
                contains_error = true;
            }
        }

        if self.datasets.is_empty() {
            error!("No datasets defined, nothing to submit");
            contains_error = true;
        }

        contains_error
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("jobs")
}
