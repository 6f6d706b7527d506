use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use thiserror::Error;
use tracing::error;

/// the batch scheduler submission tool
const SBATCH: &str = "sbatch";

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Failed to spawn {SBATCH}")]
    Spawn(#[source] std::io::Error),
    #[error("Scheduler rejected {} with {}", script.display(), status)]
    Rejected {
        script: PathBuf,
        status: std::process::ExitStatus,
    },
}

/// Hand the generated script to the scheduler. Returns the scheduler's
/// acknowledgement line, e.g. `Submitted batch job 123456`.
pub fn submit(script: &Path) -> Result<String, SubmitError> {
    let output = Command::new(SBATCH)
        .arg(script)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(SubmitError::Spawn)?;

    if !output.status.success() {
        error!(
            script = %script.display(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Submission failed"
        );

        return Err(SubmitError::Rejected {
            script: script.to_owned(),
            status: output.status,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}
