use crate::{
    batch::{self, LoadedStep, PlanError},
    collector::{DatasetLocator, ResolveError},
    config::JobConfig,
    counter::{CounterError, JobCounter},
    credential::{self, ProxySession},
    script::{self, ScriptParams},
    submit::{self, SubmitError},
    template::Slot,
};
use std::fs;
use thiserror::Error;
use tracing::{error, info, warn};

/// name of the rendered submission script inside the input directory
pub const SCRIPT_NAME: &str = "submit.sh";

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Step templates failed to load")]
    Plan(#[from] PlanError),
    #[error("Dataset resolution failed")]
    Resolve(#[from] ResolveError),
    #[error("Job id allocation failed")]
    Counter(#[from] CounterError),
    #[error("Failed to write generated files")]
    Io(#[from] std::io::Error),
    #[error("Scheduler submission failed")]
    Submit(#[from] SubmitError),
}

/// Drives one dataset at a time through resolve -> batch -> render -> submit.
/// Strictly sequential; nothing is retried and partially written namespaces
/// are left on disk when a later stage fails.
pub struct Planner {
    config: JobConfig,
    steps: Vec<LoadedStep>,
    counter: JobCounter,
    files_per_job: usize,
    dry_run: bool,
}

impl Planner {
    pub fn load(
        config: JobConfig,
        files_per_job: usize,
        dry_run: bool,
    ) -> Result<Self, PlannerError> {
        let steps = config
            .steps
            .iter()
            .map(|step| LoadedStep::load(&step.name, &step.config))
            .collect::<Result<Vec<_>, _>>()?;

        // a later step without an input slot cannot consume its predecessor
        for step in steps.iter().skip(1) {
            if !step.template.has_slot(Slot::InputFiles) {
                warn!(
                    step = %step.name,
                    "Step template has no input file assignment, chained input will not apply"
                );
            }
        }

        let counter = JobCounter::new(config.counter_path());

        Ok(Self {
            config,
            steps,
            counter,
            files_per_job,
            dry_run,
        })
    }

    /// Submit one dataset. Returns Ok(false) when the dataset was skipped
    /// (unknown name or empty resolution); hard failures propagate and are
    /// expected to end the run.
    pub fn submit_dataset(
        &self,
        name: &str,
        proxy: &mut ProxySession,
    ) -> Result<bool, PlannerError> {
        let Some(locator) = self.config.datasets.get(name) else {
            error!(dataset = name, "Dataset is not defined in the job configuration, skipping");
            return Ok(false);
        };

        let files = DatasetLocator::classify(locator).resolve(proxy)?;
        let batches = batch::partition(files, self.files_per_job);
        if batches.is_empty() {
            error!(
                dataset = name,
                locator = %locator,
                "Dataset resolved to zero files, skipping"
            );
            return Ok(false);
        }

        let plan = batch::build_plan(&self.steps, &batches);

        // the counter file lives in the work dir, make sure it exists first
        fs::create_dir_all(&self.config.work_dir)?;
        let job_id = self.counter.next_job_id()?;
        let namespace = self.config.work_dir.join(format!("{job_id:06}"));
        let input_dir = namespace.join("input");
        let output_dir = namespace.join("output");
        fs::create_dir_all(&input_dir)?;
        fs::create_dir_all(&output_dir)?;

        info!(
            dataset = name,
            job_id,
            nbatches = plan.nbatches,
            namespace = %namespace.display(),
            "Prepared job namespace"
        );

        for generated in plan.configs.iter() {
            fs::write(input_dir.join(&generated.file_name), &generated.content)?;
        }

        let proxy_path = proxy.required().then(credential::proxy_path);
        let script = script::render(&ScriptParams {
            dataset: name,
            release_dir: &self.config.cmssw_release,
            nbatches: plan.nbatches,
            step_config_patterns: &plan.step_config_patterns,
            input_dir: &input_dir,
            output_dir: &output_dir,
            proxy_path: proxy_path.as_deref(),
            final_output_pattern: &plan.final_output_pattern,
        });
        let script_path = input_dir.join(SCRIPT_NAME);
        fs::write(&script_path, script)?;

        if self.dry_run {
            info!(
                dataset = name,
                script = %script_path.display(),
                "Dry run, skipping scheduler submission"
            );
        } else {
            let acknowledgement = submit::submit(&script_path)?;
            info!(dataset = name, "Scheduler accepted job: {acknowledgement}");
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const TEMPLATE: &str = r#"import FWCore.ParameterSet.Config as cms
    fileNames = cms.untracked.vstring('file:placeholder.root'),
    fileName = cms.untracked.string('placeholder.root'),
"#;

    /// config dir with a release, two step templates and one local dataset
    fn fixture(root: &Path, nfiles: usize) -> JobConfig {
        fs::create_dir(root.join("CMSSW_10_6_30")).unwrap();
        fs::create_dir(root.join("dataset")).unwrap();
        for index in 0..nfiles {
            fs::write(root.join(format!("dataset/events_{index:02}.root")), []).unwrap();
        }
        fs::write(root.join("reco_cfg.py"), TEMPLATE).unwrap();
        fs::write(root.join("ntuple_cfg.py"), TEMPLATE).unwrap();

        let yaml = format!(
            r#"cmsswRelease: {root}/CMSSW_10_6_30
steps:
  - name: reco
    config: reco_cfg.py
  - name: ntuple
    config: ntuple_cfg.py
datasets:
  signal: {root}/dataset
"#,
            root = root.display()
        );
        fs::write(root.join(crate::config::JOB_CONFIG_NAME), yaml).unwrap();

        JobConfig::load(root).unwrap()
    }

    #[test]
    fn dry_run_writes_the_full_namespace_without_submitting() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path(), 12);
        let work_dir = config.work_dir.clone();
        let planner = Planner::load(config, 5, true).unwrap();
        let mut proxy = ProxySession::new();

        assert!(planner.submit_dataset("signal", &mut proxy).unwrap());

        // first job id of a fresh counter is 0
        let input_dir = work_dir.join("000000/input");
        assert!(work_dir.join("000000/output").is_dir());
        assert_eq!(
            fs::read_to_string(work_dir.join(".jobcounter")).unwrap(),
            "1"
        );

        // 2 steps x 3 batches
        for step in ["reco_cfg", "ntuple_cfg"] {
            for index in 0..3 {
                assert!(input_dir.join(format!("{step}_{index}.py")).is_file());
            }
        }

        let script = fs::read_to_string(input_dir.join(SCRIPT_NAME)).unwrap();
        assert!(script.contains("#SBATCH --array=0-2"));
        assert!(script.contains("cmsRun"));
        // local dataset only: no catalog query, no proxy in the script
        assert!(!proxy.required());
        assert!(!script.contains("X509_USER_PROXY"));
    }

    #[test]
    fn second_step_consumes_the_first_steps_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path(), 12);
        let work_dir = config.work_dir.clone();
        let planner = Planner::load(config, 5, true).unwrap();

        planner
            .submit_dataset("signal", &mut ProxySession::new())
            .unwrap();

        for index in 0..3 {
            let content = fs::read_to_string(
                work_dir.join(format!("000000/input/ntuple_cfg_{index}.py")),
            )
            .unwrap();
            assert!(content.contains(&format!(
                "fileNames = cms.untracked.vstring('file:reco_{index}.root'),"
            )));
        }
    }

    #[test]
    fn unknown_dataset_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path(), 1);
        let work_dir = config.work_dir.clone();
        let planner = Planner::load(config, 5, true).unwrap();

        let submitted = planner
            .submit_dataset("background", &mut ProxySession::new())
            .unwrap();

        assert!(!submitted);
        // nothing allocated for a skipped dataset
        assert!(!work_dir.join(".jobcounter").exists());
    }

    #[test]
    fn empty_dataset_allocates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path(), 0);
        let work_dir = config.work_dir.clone();
        let planner = Planner::load(config, 5, true).unwrap();

        let submitted = planner
            .submit_dataset("signal", &mut ProxySession::new())
            .unwrap();

        assert!(!submitted);
        assert!(!work_dir.join("000000").exists());
    }

    #[test]
    fn consecutive_datasets_get_distinct_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path(), 3);
        config
            .datasets
            .insert("signal2".to_owned(), dir.path().join("dataset").display().to_string());
        let work_dir = config.work_dir.clone();
        let planner = Planner::load(config, 5, true).unwrap();
        let mut proxy = ProxySession::new();

        assert!(planner.submit_dataset("signal", &mut proxy).unwrap());
        assert!(planner.submit_dataset("signal2", &mut proxy).unwrap());

        assert!(work_dir.join("000000/input").is_dir());
        assert!(work_dir.join("000001/input").is_dir());
    }
}
