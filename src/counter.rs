use nix::fcntl::{flock, FlockArg};
use std::{
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom, Write},
    os::fd::AsRawFd,
    path::PathBuf,
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("Failed to access the job counter file")]
    Io(#[from] std::io::Error),
    #[error("Failed to lock the job counter file")]
    Lock(#[from] nix::Error),
    #[error("Job counter file holds no number")]
    Corrupt(#[from] std::num::ParseIntError),
}

/// Monotonic job identifier source, persisted as a single integer in a file.
/// The read-increment-write runs under an advisory exclusive lock, which
/// keeps a crashed writer from leaving the lock behind but does not make
/// concurrent invocations safe: callers are expected to serialize
/// externally (single-operator usage).
#[derive(Debug)]
pub struct JobCounter {
    path: PathBuf,
}

impl JobCounter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Allocate the next job identifier. A missing counter file starts the
    /// sequence at 0.
    pub fn next_job_id(&self) -> Result<u64, CounterError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;
        // lock released when `file` drops
        flock(file.as_raw_fd(), FlockArg::LockExclusive)?;

        let mut buffer = String::new();
        file.read_to_string(&mut buffer)?;
        let current = if buffer.trim().is_empty() {
            0
        } else {
            buffer.trim().parse::<u64>()?
        };

        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        write!(file, "{}", current + 1)?;

        debug!(job_id = current, counter = %self.path.display(), "Allocated job id");

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_file_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let counter = JobCounter::new(dir.path().join(".jobcounter"));

        assert_eq!(counter.next_job_id().unwrap(), 0);
        assert_eq!(
            fs::read_to_string(dir.path().join(".jobcounter")).unwrap(),
            "1"
        );
    }

    #[test]
    fn sequential_allocations_never_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let counter = JobCounter::new(dir.path().join(".jobcounter"));

        let ids: Vec<u64> = (0..5).map(|_| counter.next_job_id().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn existing_value_is_continued() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".jobcounter");
        fs::write(&path, "41\n").unwrap();

        assert_eq!(JobCounter::new(path.clone()).next_job_id().unwrap(), 41);
        assert_eq!(fs::read_to_string(&path).unwrap(), "42");
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".jobcounter");
        fs::write(&path, "not a number").unwrap();

        assert!(matches!(
            JobCounter::new(path).next_job_id(),
            Err(CounterError::Corrupt(_))
        ));
    }
}
