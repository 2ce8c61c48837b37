//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryState {
    data: Vec<u8>,
    fail_writes: bool,
    fail_replace: bool,
}

/// An in-memory storage backend.
///
/// Clones share the same bytes, so a test can keep one handle while the
/// record log owns another, then reopen a collection from the same data to
/// simulate a restart.
///
/// Writes can be made to fail with [`InMemoryBackend::set_fail_writes`],
/// which is how tests check that a failed write reaches the caller.
///
/// # Example
///
/// ```rust
/// use habitsync_storage::{StorageBackend, InMemoryBackend};
///
/// let handle = InMemoryBackend::new();
/// let mut owned = handle.clone();
/// owned.append(b"abc").unwrap();
/// assert_eq!(handle.data(), b"abc");
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    ///
    /// Useful for recovery tests that start from a damaged log.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                data,
                ..MemoryState::default()
            })),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.state.read().data.clone()
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.write().fail_writes = fail;
    }

    /// Makes every subsequent `replace` fail while appends still succeed,
    /// like a disk that cannot fit a second copy of the log.
    pub fn set_fail_replace(&self, fail: bool) {
        self.state.write().fail_replace = fail;
    }

    fn check_writable(state: &MemoryState) -> StorageResult<()> {
        if state.fail_writes {
            return Err(StorageError::WriteRejected(
                "in-memory backend is failing writes".into(),
            ));
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.state.read().data.clone())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut state = self.state.write();
        Self::check_writable(&state)?;
        let offset = state.data.len() as u64;
        state.data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Self::check_writable(&self.state.read())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.state.read().data.len() as u64)
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        let mut state = self.state.write();
        Self::check_writable(&state)?;
        let size = state.data.len() as u64;
        if new_len > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_len,
                size,
            });
        }
        state.data.truncate(new_len as usize);
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut state = self.state.write();
        Self::check_writable(&state)?;
        if state.fail_replace {
            return Err(StorageError::WriteRejected(
                "in-memory backend is failing replacements".into(),
            ));
        }
        state.data = data.to_vec();
        Ok(())
    }
}
