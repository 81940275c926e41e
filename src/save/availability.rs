//! File availability handling: waiting out another process's hold on a file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::SaveError;

/// Host filesystem operations the save pipeline depends on
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Open `path` for writing, creating it if needed and truncating it.
    /// A file held by another process must fail with an error that
    /// [`is_in_use`] recognizes.
    fn open_for_write(&self, path: &Path) -> io::Result<File>;

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Whole-file read, used for the workbook formatting is recovered from
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn open_for_write(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

/// Whether an open failure means "someone else has the file" rather than a
/// hard error such as a missing directory
pub fn is_in_use(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock
    ) {
        return true;
    }

    #[cfg(windows)]
    {
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }

    #[cfg(not(windows))]
    {
        // EBUSY, ETXTBSY
        matches!(err.raw_os_error(), Some(16) | Some(26))
    }
}

/// Shortest pause between attempts; a zero backoff would never grow
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, initial_backoff: Duration, max_backoff: Duration) -> Self {
        let initial_backoff = initial_backoff.max(MIN_BACKOFF);
        RetryPolicy {
            timeout,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }
}

/// Open `path` for writing, sleeping between attempts while it is in use.
///
/// Returns the open file and the number of attempts that found it busy.
/// Nothing is written to `path` unless an attempt succeeds.
pub fn open_with_retry(
    fs: &dyn Filesystem,
    path: &Path,
    policy: &RetryPolicy,
) -> Result<(File, u32), SaveError> {
    let started = Instant::now();
    let mut backoff = policy.initial_backoff;
    let mut busy_attempts = 0u32;

    loop {
        let err = match fs.open_for_write(path) {
            Ok(file) => return Ok((file, busy_attempts)),
            Err(err) if is_in_use(&err) => err,
            Err(source) => {
                return Err(SaveError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        busy_attempts += 1;
        let waited = started.elapsed();
        if waited >= policy.timeout {
            warn!(path = %path.display(), ?waited, attempts = busy_attempts, "file still in use, giving up");
            return Err(SaveError::FileUnavailable {
                path: path.to_path_buf(),
                waited,
            });
        }

        if busy_attempts == 1 {
            warn!(path = %path.display(), error = %err, "file in use, waiting for it to be released");
        } else {
            debug!(path = %path.display(), attempt = busy_attempts, ?backoff, "file still in use");
        }

        thread::sleep(backoff.min(policy.timeout - waited));
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports the file busy for the first `busy_for` opens
    struct BusyFor {
        busy_for: u32,
        opens: AtomicU32,
    }

    impl Filesystem for BusyFor {
        fn exists(&self, path: &Path) -> bool {
            OsFilesystem.exists(path)
        }

        fn open_for_write(&self, path: &Path) -> io::Result<File> {
            if self.opens.fetch_add(1, Ordering::SeqCst) < self.busy_for {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }
            OsFilesystem.open_for_write(path)
        }

        fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
            OsFilesystem.copy(from, to)
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            OsFilesystem.read(path)
        }
    }

    fn fast_policy(timeout_ms: u64) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(5),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn test_in_use_classification() {
        assert!(is_in_use(&io::Error::new(io::ErrorKind::PermissionDenied, "x")));
        assert!(is_in_use(&io::Error::new(io::ErrorKind::WouldBlock, "x")));
        assert!(!is_in_use(&io::Error::new(io::ErrorKind::NotFound, "x")));
    }

    #[test]
    fn test_retries_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.csv");
        let fs = BusyFor { busy_for: 3, opens: AtomicU32::new(0) };

        let (_file, retries) = open_with_retry(&fs, &path, &fast_policy(5_000)).unwrap();
        assert_eq!(retries, 3);
    }

    #[test]
    fn test_gives_up_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.csv");
        let fs = BusyFor { busy_for: u32::MAX, opens: AtomicU32::new(0) };

        let started = Instant::now();
        let err = open_with_retry(&fs, &path, &fast_policy(60)).unwrap_err();

        assert!(matches!(err, SaveError::FileUnavailable { .. }));
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(!path.exists());
    }

    #[test]
    fn test_zero_backoff_still_sleeps_between_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(30), Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.initial_backoff, MIN_BACKOFF);
        assert_eq!(policy.max_backoff, MIN_BACKOFF);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.csv");
        let fs = BusyFor { busy_for: u32::MAX, opens: AtomicU32::new(0) };

        assert!(open_with_retry(&fs, &path, &policy).is_err());
        // Roughly one attempt per millisecond, not a busy spin
        assert!(fs.opens.load(Ordering::SeqCst) <= 40);
    }

    #[test]
    fn test_hard_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("out.csv");

        let err = open_with_retry(&OsFilesystem, &path, &fast_policy(5_000)).unwrap_err();
        assert!(matches!(err, SaveError::Io { .. }));
    }
}
