//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK            # Advisory lock for single-process access
//! ├─ habits.log      # Habit journal
//! ├─ logs.log        # Log entry journal
//! ├─ metadata.log    # Metadata journal
//! └─ queue.log       # Pending operation journal
//! ```
//!
//! The local store and the operation queue are owned by one host process;
//! the LOCK file enforces that across processes.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use habitsync_storage::FileBackend;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const HABITS_FILE: &str = "habits.log";
const LOGS_FILE: &str = "logs.log";
const METADATA_FILE: &str = "metadata.log";
const QUEUE_FILE: &str = "queue.log";

/// An opened, exclusively locked store directory.
///
/// Keep it alive for as long as the store and queue opened from it are in
/// use; dropping it releases the lock.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path is not a directory
    /// - Another process holds the lock ([`CoreError::StoreLocked`])
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::InvalidDirectory(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(CoreError::InvalidDirectory(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        tracing::debug!(path = %path.display(), "store directory opened");
        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the habit journal file.
    pub fn habits_backend(&self) -> CoreResult<FileBackend> {
        Ok(FileBackend::open(&self.path.join(HABITS_FILE))?)
    }

    /// Opens the log entry journal file.
    pub fn logs_backend(&self) -> CoreResult<FileBackend> {
        Ok(FileBackend::open(&self.path.join(LOGS_FILE))?)
    }

    /// Opens the metadata journal file.
    pub fn metadata_backend(&self) -> CoreResult<FileBackend> {
        Ok(FileBackend::open(&self.path.join(METADATA_FILE))?)
    }

    /// Opens the operation queue journal file.
    pub fn queue_backend(&self) -> CoreResult<FileBackend> {
        Ok(FileBackend::open(&self.path.join(QUEUE_FILE))?)
    }
}
