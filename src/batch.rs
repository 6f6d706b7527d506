use crate::{
    collector::LOCAL_FILE_MARKER,
    template::{ConfigTemplate, TemplateError},
};
use itertools::Itertools;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Step template failed to load")]
    Template(#[from] TemplateError),
    #[error("Step config path has no usable file name: {0}")]
    BadTemplateName(String),
}

/// A fixed-size chunk of input files processed as one scheduler task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub files: Vec<String>,
}

/// Split `files` into consecutive batches of at most `files_per_job` entries.
/// The last batch may be short; an empty list yields no batches.
pub fn partition(files: Vec<String>, files_per_job: usize) -> Vec<Batch> {
    let chunks = files.into_iter().chunks(files_per_job);

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            files: chunk.collect(),
        })
        .collect()
}

/// One processing stage with its parsed config template
#[derive(Debug, Clone)]
pub struct LoadedStep {
    pub name: String,
    /// template file stem, used to derive generated config names
    pub stem: String,
    pub template: ConfigTemplate,
}

impl LoadedStep {
    pub fn load(name: &str, template_path: &Path) -> Result<Self, PlanError> {
        let stem = template_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| PlanError::BadTemplateName(template_path.display().to_string()))?
            .to_owned();

        Ok(Self {
            name: name.to_owned(),
            stem,
            template: ConfigTemplate::load(template_path)?,
        })
    }
}

/// A generated config for one (batch, step) pair
#[derive(Debug, Clone)]
pub struct PlannedConfig {
    pub file_name: String,
    pub content: String,
}

/// Everything derived from one dataset's resolved file list: the per-task
/// configs plus the values the submission script needs. The batch count and
/// the final output pattern are computed here as explicit values.
#[derive(Debug, Clone)]
pub struct DatasetPlan {
    pub nbatches: usize,
    pub configs: Vec<PlannedConfig>,
    /// per-step generated config names with the scheduler task-index variable
    pub step_config_patterns: Vec<String>,
    /// the last step's output name with the scheduler task-index variable
    pub final_output_pattern: String,
}

/// scheduler-provided per-task index, substituted at runtime by SLURM
pub const TASK_INDEX: &str = "${SLURM_ARRAY_TASK_ID}";

/// Chain the steps over every batch: step 0 consumes the batch's resolved
/// files, step k>0 consumes exactly the previous step's declared output.
pub fn build_plan(steps: &[LoadedStep], batches: &[Batch]) -> DatasetPlan {
    let mut configs = Vec::with_capacity(batches.len() * steps.len());

    for batch in batches {
        let mut previous_output: Option<String> = None;

        for step in steps {
            let output = step_output(&step.name, &batch.index.to_string());
            let inputs = match previous_output.take() {
                None => batch.files.clone(),
                Some(output) => vec![format!("{LOCAL_FILE_MARKER}{output}")],
            };

            debug!(
                step = %step.name,
                batch = batch.index,
                inputs = inputs.len(),
                output = %output,
                "Rendering step config"
            );

            configs.push(PlannedConfig {
                file_name: format!("{}_{}.py", step.stem, batch.index),
                content: step.template.render(&inputs, &output),
            });
            previous_output = Some(output);
        }
    }

    DatasetPlan {
        nbatches: batches.len(),
        configs,
        step_config_patterns: steps
            .iter()
            .map(|step| format!("{}_{TASK_INDEX}.py", step.stem))
            .collect(),
        final_output_pattern: steps
            .last()
            .map(|step| step_output(&step.name, TASK_INDEX))
            .unwrap_or_default(),
    }
}

fn step_output(step_name: &str, index: &str) -> String {
    format!("{step_name}_{index}.root")
}
