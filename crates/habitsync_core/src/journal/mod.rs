//! Append-only journals backing each local collection.
//!
//! A journal is a sequence of frames, each holding one CBOR-encoded batch of
//! [`Mutation`]s. One write call is one frame, so a multi-record save lands
//! completely or not at all. Opening a journal replays every batch; the
//! owner folds them into its in-memory view.

mod frame;

pub use frame::{compute_crc32, decode_frames, encode_frame, DecodedFrames, FRAME_MAGIC, FRAME_VERSION};

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use habitsync_storage::StorageBackend;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// A single change recorded in a journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation<T> {
    /// Insert or overwrite a record.
    Put(T),
    /// Drop a record by key.
    Remove(String),
}

/// A journal of mutations over one storage backend.
pub struct Journal<T> {
    collection: &'static str,
    backend: Box<dyn StorageBackend>,
    config: StoreConfig,
    frames: usize,
    _records: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> Journal<T> {
    /// Opens a journal and returns it together with every recorded mutation.
    ///
    /// A torn frame at the tail is cut off so later appends start on a clean
    /// boundary.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be read, a frame is corrupt, or a batch
    /// does not decode.
    pub fn open(
        collection: &'static str,
        mut backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> CoreResult<(Self, Vec<Mutation<T>>)> {
        let bytes = backend.read_all()?;
        let decoded = decode_frames(collection, &bytes)?;

        let mut mutations = Vec::new();
        for payload in &decoded.payloads {
            let batch: Vec<Mutation<T>> =
                ciborium::from_reader(*payload).map_err(CoreError::codec)?;
            mutations.extend(batch);
        }

        if decoded.valid_len < bytes.len() {
            tracing::warn!(
                collection,
                dropped = bytes.len() - decoded.valid_len,
                "truncating torn journal tail"
            );
            backend.truncate(decoded.valid_len as u64)?;
        }

        let journal = Self {
            collection,
            backend,
            config,
            frames: decoded.payloads.len(),
            _records: PhantomData,
        };
        Ok((journal, mutations))
    }

    /// Appends one batch as a single frame.
    ///
    /// # Errors
    ///
    /// Fails if encoding or the backend write fails; nothing is recorded then.
    pub fn append(&mut self, batch: &[Mutation<&T>]) -> CoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut payload = Vec::new();
        ciborium::into_writer(batch, &mut payload).map_err(CoreError::codec)?;

        self.backend.append(&encode_frame(&payload))?;
        if self.config.sync_on_write {
            self.backend.sync()?;
        }
        self.frames += 1;
        Ok(())
    }

    /// Rewrites the journal as one snapshot frame holding `live`.
    ///
    /// # Errors
    ///
    /// Fails if the replacement cannot be written; the old journal stays.
    pub fn rewrite<'a, I>(&mut self, live: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let batch: Vec<Mutation<&T>> = live.into_iter().map(Mutation::Put).collect();
        if batch.is_empty() {
            self.backend.replace(&[])?;
            self.frames = 0;
            return Ok(());
        }

        let mut payload = Vec::new();
        ciborium::into_writer(&batch, &mut payload).map_err(CoreError::codec)?;
        self.backend.replace(&encode_frame(&payload))?;
        self.frames = 1;
        tracing::debug!(collection = self.collection, records = batch.len(), "journal compacted");
        Ok(())
    }

    /// Compacts if the journal has grown well past its live record count.
    /// Returns true if a snapshot was written.
    ///
    /// Callers run this after a successful append, so a failed rewrite is
    /// logged and the longer journal is kept. The next write tries again.
    pub fn maybe_compact<'a, I>(&mut self, live_count: usize, live: I) -> bool
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        if !self.config.should_compact(self.frames, live_count) {
            return false;
        }
        match self.rewrite(live) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    collection = self.collection,
                    frames = self.frames,
                    error = %e,
                    "journal compaction failed; keeping uncompacted log"
                );
                false
            }
        }
    }

    /// Number of frames written since the last snapshot.
    pub fn frame_count(&self) -> usize {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habitsync_storage::InMemoryBackend;

    fn open(backend: &InMemoryBackend) -> (Journal<String>, Vec<Mutation<String>>) {
        Journal::open("test", Box::new(backend.clone()), StoreConfig::default()).unwrap()
    }

    #[test]
    fn replay_returns_batches_in_order() {
        let backend = InMemoryBackend::new();
        {
            let (mut journal, replayed) = open(&backend);
            assert!(replayed.is_empty());
            let a = "a".to_string();
            let b = "b".to_string();
            journal
                .append(&[Mutation::Put(&a), Mutation::Put(&b)])
                .unwrap();
            journal.append(&[Mutation::Remove("a".into())]).unwrap();
            assert_eq!(journal.frame_count(), 2);
        }

        let (journal, replayed) = open(&backend);
        assert_eq!(journal.frame_count(), 2);
        assert_eq!(
            replayed,
            vec![
                Mutation::Put("a".to_string()),
                Mutation::Put("b".to_string()),
                Mutation::Remove("a".into()),
            ]
        );
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let backend = InMemoryBackend::new();
        {
            let (mut journal, _) = open(&backend);
            let a = "a".to_string();
            journal.append(&[Mutation::Put(&a)]).unwrap();
        }
        let good_len = backend.data().len();
        let mut damaged = backend.clone();
        damaged.append(&FRAME_MAGIC).unwrap();
        damaged.append(&[1, 0, 99]).unwrap();

        let (_, replayed) = open(&backend);
        assert_eq!(replayed, vec![Mutation::Put("a".to_string())]);
        assert_eq!(backend.data().len(), good_len);
    }

    #[test]
    fn failed_append_is_reported() {
        let backend = InMemoryBackend::new();
        let (mut journal, _) = open(&backend);
        backend.set_fail_writes(true);

        let a = "a".to_string();
        let err = journal.append(&[Mutation::Put(&a)]).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(journal.frame_count(), 0);
    }

    #[test]
    fn failed_compaction_keeps_appended_frames() {
        let backend = InMemoryBackend::new();
        let config = StoreConfig::new().with_compaction(1, 1);
        let (mut journal, _) =
            Journal::<String>::open("test", Box::new(backend.clone()), config).unwrap();
        backend.set_fail_replace(true);

        let a = "a".to_string();
        let b = "b".to_string();
        journal.append(&[Mutation::Put(&a)]).unwrap();
        journal.append(&[Mutation::Put(&b)]).unwrap();
        assert!(!journal.maybe_compact(1, [&b]));
        assert_eq!(journal.frame_count(), 2);

        backend.set_fail_replace(false);
        assert!(journal.maybe_compact(1, [&b]));
        let (_, replayed) = open(&backend);
        assert_eq!(replayed, vec![Mutation::Put("b".to_string())]);
    }

    #[test]
    fn rewrite_collapses_history() {
        let backend = InMemoryBackend::new();
        let (mut journal, _) = open(&backend);
        for i in 0..10 {
            let value = format!("v{i}");
            journal.append(&[Mutation::Put(&value)]).unwrap();
        }
        let live = vec!["v9".to_string()];
        journal.rewrite(&live).unwrap();
        assert_eq!(journal.frame_count(), 1);

        let (_, replayed) = open(&backend);
        assert_eq!(replayed, vec![Mutation::Put("v9".to_string())]);

        let mut journal = open(&backend).0;
        journal.rewrite(std::iter::empty()).unwrap();
        assert!(backend.data().is_empty());
    }
}
