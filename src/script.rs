use std::{fmt::Write, path::Path};

/// wall-clock limit per array task
const WALL_TIME: &str = "48:00:00";
/// environment bootstrap shared by all CMSSW releases
const CMS_SETUP: &str = "/cvmfs/cms.cern.ch/cmsset_default.sh";

/// Everything the per-dataset submission script is rendered from
#[derive(Debug)]
pub struct ScriptParams<'a> {
    pub dataset: &'a str,
    pub release_dir: &'a Path,
    pub nbatches: usize,
    /// per-step generated config names, parameterized by the task index
    pub step_config_patterns: &'a [String],
    pub input_dir: &'a Path,
    pub output_dir: &'a Path,
    /// present when any dataset of this run needed a catalog query
    pub proxy_path: Option<&'a Path>,
    pub final_output_pattern: &'a str,
}

/// Render the SLURM array script for one dataset: one task per batch, each
/// task runs the step chain in a scratch directory and moves the final
/// step's output into the job's output directory.
pub fn render(params: &ScriptParams) -> String {
    let proxy_block = match params.proxy_path {
        Some(path) => format!(
            "\nexport X509_USER_PROXY={}\nvoms-proxy-info --exists\n",
            path.display()
        ),
        None => String::new(),
    };

    let mut run_block = String::new();
    for pattern in params.step_config_patterns {
        // infallible, writing into a String
        writeln!(run_block, "cmsRun {}/{pattern}", params.input_dir.display()).unwrap();
    }

    format!(
        r#"#!/bin/bash
#SBATCH --job-name=cmssub_{job_name}
#SBATCH --array=0-{last_task}
#SBATCH --time={WALL_TIME}
#SBATCH --output={input_dir}/task_%a.log

set -e
{proxy_block}
source {CMS_SETUP}
cd {release}/src
eval "$(scramv1 runtime -sh)"

SCRATCH="${{TMPDIR:-/tmp}}/cmssub_${{SLURM_JOB_ID}}_${{SLURM_ARRAY_TASK_ID}}"
mkdir -p "$SCRATCH"
cd "$SCRATCH"

{run_block}
mv {final_output} {output_dir}/
cd /
rm -rf "$SCRATCH"
"#,
        job_name = job_name(params.dataset),
        last_task = params.nbatches.saturating_sub(1),
        input_dir = params.input_dir.display(),
        release = params.release_dir.display(),
        final_output = params.final_output_pattern,
        output_dir = params.output_dir.display(),
    )
}

/// dataset names carry slashes; fold anything scheduler-hostile to `_`
fn job_name(dataset: &str) -> String {
    dataset
        .trim_matches('/')
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '-' {
                character
            } else {
                '_'
            }
        })
        .collect()
}
