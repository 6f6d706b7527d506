use std::{
    env,
    path::PathBuf,
    process::{Command, Stdio},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// remaining validity below which the proxy is renewed up front
const RENEWAL_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);
/// validity requested on renewal
const RENEWAL_VALIDITY: &str = "192:00";

const PROXY_INFO: &str = "voms-proxy-info";
const PROXY_INIT: &str = "voms-proxy-init";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to spawn {tool}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Proxy renewal failed with {0}")]
    Renewal(std::process::ExitStatus),
}

/// Tracks the grid proxy over one run: the freshness check happens at most
/// once, before the first catalog query, and `required` records whether the
/// submission scripts of this run need the proxy at all.
#[derive(Debug, Default)]
pub struct ProxySession {
    checked: bool,
    required: bool,
}

impl ProxySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// whether any catalog query in this run needed the proxy
    pub fn required(&self) -> bool {
        self.required
    }

    /// Make sure the proxy outlives the renewal threshold, renewing it if
    /// necessary. Called before every catalog query; only the first call of
    /// a run does any work.
    pub fn ensure_fresh(&mut self) -> Result<(), CredentialError> {
        self.required = true;

        if self.checked {
            return Ok(());
        }

        let remaining = timeleft()?;
        if remaining < RENEWAL_THRESHOLD {
            info!(
                remaining_secs = remaining.as_secs(),
                "Proxy close to expiry, renewing"
            );
            renew()?;
        } else {
            debug!(remaining_secs = remaining.as_secs(), "Proxy still valid");
        }

        self.checked = true;
        Ok(())
    }
}

/// Path the submission script exports; honors an operator override via the
/// conventional environment variable.
pub fn proxy_path() -> PathBuf {
    env::var_os("X509_USER_PROXY")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("/tmp/x509up_u{}", nix::unistd::getuid().as_raw())))
}

/// Remaining proxy validity. A failing or unparsable check reads as an
/// expired proxy so the renewal path decides what to do next.
fn timeleft() -> Result<Duration, CredentialError> {
    let output = Command::new(PROXY_INFO)
        .arg("--timeleft")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| CredentialError::Spawn {
            tool: PROXY_INFO,
            source,
        })?;

    if !output.status.success() {
        warn!(status = %output.status, "Proxy check failed, treating proxy as expired");
        return Ok(Duration::ZERO);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.trim().parse::<u64>() {
        Ok(seconds) => Ok(Duration::from_secs(seconds)),
        Err(_) => {
            warn!(output = %stdout.trim(), "Unexpected proxy check output, treating proxy as expired");
            Ok(Duration::ZERO)
        }
    }
}

/// Renew the proxy. Runs with inherited stdio so the operator can enter
/// their passphrase; a non-zero exit aborts the run.
fn renew() -> Result<(), CredentialError> {
    let status = Command::new(PROXY_INIT)
        .args(["--voms", "cms", "--valid", RENEWAL_VALIDITY])
        .status()
        .map_err(|source| CredentialError::Spawn {
            tool: PROXY_INIT,
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(CredentialError::Renewal(status))
    }
}
