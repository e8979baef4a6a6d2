//! # Namespace Lock
//!
//! One lock file per namespace, locked with `fs2` (flock on Unix, LockFile on
//! Windows).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::error::LockError;

/// Exclusive lock on one filter namespace.
///
/// Released on drop (RAII).
///
/// # Example
///
/// ```ignore
/// let lock = NamespaceLock::acquire(Path::new("/var/lock/filters"), "dedup")?;
/// filter.insert(b"key")?;
/// // Lock is held until `lock` goes out of scope
/// ```
#[derive(Debug)]
pub struct NamespaceLock {
    /// The lock file handle (kept open to maintain lock)
    file: File,
    path: PathBuf,
    namespace: String,
}

impl NamespaceLock {
    /// Try once to take the lock for `namespace` below `lock_dir`.
    ///
    /// # Errors
    ///
    /// Returns `LockError::AlreadyLocked` if another handle holds the lock.
    pub fn acquire(lock_dir: &Path, namespace: &str) -> Result<Self, LockError> {
        std::fs::create_dir_all(lock_dir).map_err(LockError::CreateFailed)?;
        let path = lock_dir.join(Self::file_name(namespace));

        // Not truncated on open: the holder's PID must survive a failed attempt
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(LockError::CreateFailed)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::AlreadyLocked {
                namespace: namespace.to_string(),
                pid: Self::read_pid(&mut file),
            });
        }

        file.set_len(0).map_err(LockError::WriteFailed)?;
        file.seek(SeekFrom::Start(0))
            .map_err(LockError::WriteFailed)?;
        writeln!(file, "{}", std::process::id()).map_err(LockError::WriteFailed)?;
        file.sync_all().map_err(LockError::WriteFailed)?;

        debug!(namespace, path = %path.display(), "Acquired namespace lock");
        Ok(Self {
            file,
            path,
            namespace: namespace.to_string(),
        })
    }

    /// Retry [`acquire`](Self::acquire) with exponential backoff until `timeout`.
    pub fn acquire_timeout(
        lock_dir: &Path,
        namespace: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let deadline = Instant::now() + timeout;
        let mut retry_delay = Duration::from_millis(10);

        loop {
            match Self::acquire(lock_dir, namespace) {
                Err(LockError::AlreadyLocked { .. }) if Instant::now() < deadline => {
                    // Capped at 250ms
                    std::thread::sleep(retry_delay);
                    retry_delay = (retry_delay * 2).min(Duration::from_millis(250));
                }
                result => return result,
            }
        }
    }

    /// Lock file name for a namespace.
    ///
    /// Bytes other than ASCII alphanumerics, `-` and `_` become `%XX`, so
    /// distinct namespaces never share a file.
    fn file_name(namespace: &str) -> String {
        let mut name = String::with_capacity(namespace.len() + 5);
        for byte in namespace.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        name.push_str(".lock");
        name
    }

    fn read_pid(file: &mut File) -> Option<u32> {
        let mut content = String::new();
        file.read_to_string(&mut content).ok()?;
        content.trim().parse().ok()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NamespaceLock {
    fn drop(&mut self) {
        #[allow(clippy::incompatible_msrv)]
        let _ = self.file.unlock();
        debug!(namespace = %self.namespace, "Released namespace lock");
    }
}
