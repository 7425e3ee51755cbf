use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub enum LockError {
    Busy { path: PathBuf, waited: Duration },
    Io(std::io::Error),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Busy { path, waited } => write!(
                f,
                "data directory is locked by another writer ({}, waited {} ms)",
                path.display(),
                waited.as_millis()
            ),
            LockError::Io(err) => write!(f, "lock I/O error: {}", err),
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::Io(err) => Some(err),
            LockError::Busy { .. } => None,
        }
    }
}

impl From<std::io::Error> for LockError {
    fn from(value: std::io::Error) -> Self {
        LockError::Io(value)
    }
}

/// Cross-process writer guard. The lock file is removed on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _file: File,
}

impl FileLock {
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let start = Instant::now();
        loop {
            match try_acquire(path)? {
                Some(guard) => return Ok(guard),
                None if start.elapsed() >= timeout => {
                    return Err(LockError::Busy {
                        path: path.to_path_buf(),
                        waited: start.elapsed(),
                    });
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    /// Takes the lock if it is free or its holder has died; never waits.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        try_acquire(path)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn try_acquire(path: &Path) -> Result<Option<FileLock>, LockError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match create(path)? {
        Some(lock) => Ok(Some(lock)),
        None if break_if_stale(path)? => create(path),
        None => Ok(None),
    }
}

fn create(path: &Path) -> Result<Option<FileLock>, LockError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            // Holder pid; a lock whose holder is gone is broken by the next writer.
            let _ = writeln!(file, "{}", std::process::id());
            debug!(path = %path.display(), "acquired data directory lock");
            Ok(Some(FileLock {
                path: path.to_path_buf(),
                _file: file,
            }))
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(err) => Err(LockError::Io(err)),
    }
}

/// Removes the lock file when the pid recorded in it no longer runs, which is
/// what a writer killed mid-commit leaves behind.
fn break_if_stale(path: &Path) -> Result<bool, LockError> {
    let Some(pid) = holder_pid(path) else {
        return Ok(false);
    };
    if process_is_running(pid) {
        return Ok(false);
    }
    warn!(path = %path.display(), pid, "breaking stale data directory lock");
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
        Err(err) => Err(LockError::Io(err)),
    }
}

fn holder_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

pub(crate) fn procfs_available() -> bool {
    Path::new("/proc/self").exists()
}

/// Without procfs liveness cannot be told, so the holder is presumed alive.
fn process_is_running(pid: u32) -> bool {
    if pid == std::process::id() || !procfs_available() {
        return true;
    }
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;
    use uuid::Uuid;

    use super::{holder_pid, procfs_available, FileLock};

    fn lock_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("maville-lock-test-{}", Uuid::now_v7()))
            .join(".maville.lock")
    }

    #[test]
    fn second_writer_is_refused_while_held() {
        let path = lock_path();
        let first = FileLock::try_acquire(&path)
            .expect("initial lock should not fail")
            .expect("initial lock should succeed");
        let second = FileLock::try_acquire(&path).expect("second lock call should not fail");
        assert!(second.is_none());
        drop(first);
        let third = FileLock::try_acquire(&path).expect("third lock call should not fail");
        assert!(third.is_some());
        drop(third);
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn acquire_times_out_when_held() {
        let path = lock_path();
        let first = FileLock::try_acquire(&path)
            .expect("initial lock should not fail")
            .expect("initial lock should succeed");
        let err = FileLock::acquire(&path, Duration::from_millis(20))
            .expect_err("lock should time out when already held");
        assert!(err.to_string().contains("locked by another writer"));
        drop(first);
        assert!(!path.exists());
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn lock_left_by_a_dead_process_is_broken() {
        if !procfs_available() {
            return;
        }
        let path = lock_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("lock dir should be creatable");
        }
        // Above any pid_max, so never a live process.
        std::fs::write(&path, format!("{}\n", u32::MAX)).expect("stale lock should be writable");

        let lock = FileLock::acquire(&path, Duration::from_millis(20))
            .expect("stale lock should be taken over");
        assert_eq!(holder_pid(&path), Some(std::process::id()));
        drop(lock);
        assert!(!path.exists());
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn lock_of_a_live_or_unknown_holder_is_kept() {
        let path = lock_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("lock dir should be creatable");
        }
        std::fs::write(&path, format!("{}\n", std::process::id()))
            .expect("live lock should be writable");
        let live = FileLock::try_acquire(&path).expect("lock call should not fail");
        assert!(live.is_none());

        std::fs::write(&path, "").expect("empty lock should be writable");
        let unknown = FileLock::try_acquire(&path).expect("lock call should not fail");
        assert!(unknown.is_none());
        assert!(path.exists());
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
