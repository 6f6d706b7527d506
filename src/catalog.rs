use crate::collector::ResolveError;
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

/// the dataset catalog query tool
const DAS_CLIENT: &str = "dasgoclient";

/// Query the catalog for all files of `dataset`. Returns the logical file
/// names, one per non-empty output line, in catalog order.
pub fn query_files(dataset: &str) -> Result<Vec<String>, ResolveError> {
    info!(dataset, "Querying catalog for dataset files");

    let output = Command::new(DAS_CLIENT)
        .arg("--query")
        .arg(format!("file dataset={dataset}"))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(ResolveError::SpawnCatalog)?;

    if !output.status.success() {
        error!(
            dataset,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Catalog query failed"
        );

        return Err(ResolveError::CatalogQuery {
            dataset: dataset.to_owned(),
            status: output.status,
        });
    }

    let files: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();

    debug!(dataset, files = files.len(), "Catalog query finished");

    Ok(files)
}
