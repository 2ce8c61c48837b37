//! Storage backend trait definition.

use crate::error::StorageResult;

/// Durable storage for a single record log.
///
/// Backends are **opaque byte stores**. The record log in `habitsync_core`
/// owns the frame format; a backend only has to keep bytes in the order they
/// were appended and survive restarts (for the durable implementations).
///
/// # Invariants
///
/// - `read_all` returns every byte appended since the last `replace`
/// - `append` writes at the current end and returns the offset it wrote at
/// - `replace` is all-or-nothing: after a crash either the old or the new
///   contents are visible, never a mix
/// - `truncate` never grows the store
pub trait StorageBackend: Send + Sync {
    /// Reads the entire contents of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. A failed append must not be
    /// reported as success; callers surface it to whoever issued the write.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes all appended data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the data could not be flushed to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if nothing has been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Cuts the store back to `new_len` bytes.
    ///
    /// Used to drop a torn frame left at the tail by an interrupted write.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_len` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_len: u64) -> StorageResult<()>;

    /// Atomically replaces the whole contents with `data`.
    ///
    /// Used for compaction and for clearing a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement could not be made durable; the
    /// previous contents are then still in place.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
