use crate::{
    catalog,
    credential::{CredentialError, ProxySession},
};
use globset::{GlobBuilder, GlobMatcher};
use ignore::{DirEntry, WalkBuilder};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// prefix marking a file reference as locally readable, not catalog-managed
pub const LOCAL_FILE_MARKER: &str = "file:";

/// data-tier suffixes that mark a locator as catalog-resolvable
const CATALOG_TIERS: [&str; 7] = [
    "/MINIAODSIM",
    "/MINIAOD",
    "/NANOAODSIM",
    "/NANOAOD",
    "/AODSIM",
    "/AOD",
    "/USER",
];

static ROOT_FILES: Lazy<GlobMatcher> = Lazy::new(|| {
    GlobBuilder::new("*.root")
        .build()
        .unwrap()
        .compile_matcher()
});

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to spawn the catalog query tool")]
    SpawnCatalog(#[source] std::io::Error),
    #[error("Catalog query for {dataset} failed with {status}")]
    CatalogQuery { dataset: String, status: std::process::ExitStatus },
    #[error("Credential refresh failed")]
    Credential(#[from] CredentialError),
    #[error("Dataset directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
}

/// Where a dataset's files live. Classification is by suffix tag; everything
/// that does not carry a known data-tier suffix is treated as a local
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetLocator {
    Catalog(String),
    Local(PathBuf),
}

impl DatasetLocator {
    pub fn classify(raw: &str) -> Self {
        if CATALOG_TIERS.iter().any(|tier| raw.ends_with(tier)) {
            Self::Catalog(raw.to_owned())
        } else {
            Self::Local(PathBuf::from(raw))
        }
    }

    /// Resolve to an ordered list of file references. Catalog locators go
    /// through the proxy session first so a stale credential is renewed
    /// before the query is issued.
    pub fn resolve(&self, proxy: &mut ProxySession) -> Result<Vec<String>, ResolveError> {
        match self {
            Self::Local(directory) => collect_local(directory),
            Self::Catalog(dataset) => {
                proxy.ensure_fresh()?;
                catalog::query_files(dataset)
            }
        }
    }
}

/// Recursively enumerate `*.root` files below `directory`, each prefixed
/// with the local-file marker. Sorted so batch composition is reproducible.
fn collect_local(directory: &Path) -> Result<Vec<String>, ResolveError> {
    if !directory.is_dir() {
        return Err(ResolveError::MissingDirectory(directory.to_owned()));
    }

    // plain enumeration: hidden entries and ignore files must not thin out
    // the dataset
    let mut files: Vec<String> = WalkBuilder::new(directory)
        .standard_filters(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!("Failed to walk dataset directory: {error}");
                None
            }
        })
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .map(DirEntry::into_path)
        .filter(|path| ROOT_FILES.is_match(path))
        .map(|path| format!("{LOCAL_FILE_MARKER}{}", path.display()))
        .collect();
    files.sort();

    debug!(directory = %directory.display(), files = files.len(), "Collected local dataset");

    Ok(files)
}
