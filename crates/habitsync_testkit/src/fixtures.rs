//! Test fixtures and store helpers.
//!
//! Provides ready-made local stores with a pinned clock and builders for
//! sample records.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use habitsync_core::{
    FixedClock, Habit, HabitStatus, LocalStore, LocalWriter, LogEntry, LogStatus, Metadata,
    OperationQueue, StoreConfig, StoreDir,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Instant every test clock starts at: 2025-01-15 12:00 UTC.
pub fn test_now() -> DateTime<Utc> {
    at(2025, 1, 15, 12, 0)
}

/// Builds a UTC instant.
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test instant")
}

/// Builds a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

/// The date of [`test_now`] shifted by `offset` days.
pub fn day(offset: i64) -> NaiveDate {
    test_now().date_naive() + Duration::days(offset)
}

/// A clock pinned at [`test_now`].
pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(test_now()))
}

/// An active habit created and last modified on the given dates.
pub fn habit(id: &str, name: &str, created: NaiveDate, modified: NaiveDate) -> Habit {
    Habit {
        habit_id: id.to_owned(),
        name: name.to_owned(),
        category: None,
        status: HabitStatus::Active,
        created_date: created,
        modified_date: modified,
    }
}

/// A log row stamped at `timestamp`.
pub fn log_entry(
    id: &str,
    habit_id: &str,
    date: NaiveDate,
    status: LogStatus,
    timestamp: Option<DateTime<Utc>>,
) -> LogEntry {
    LogEntry {
        log_id: id.to_owned(),
        habit_id: habit_id.to_owned(),
        date,
        status,
        notes: None,
        timestamp,
    }
}

/// Metadata for a test user.
pub fn metadata(user_id: &str) -> Metadata {
    Metadata::new(user_id, format!("remote-{user_id}"))
}

/// A local store, queue and writer sharing one pinned clock.
pub struct TestStore {
    /// The local store.
    pub store: Arc<LocalStore>,
    /// The operation queue.
    pub queue: Arc<OperationQueue>,
    /// The write boundary over both.
    pub writer: LocalWriter,
    /// The shared clock.
    pub clock: Arc<FixedClock>,
    // Dropped after the store so the lock outlives every handle.
    _dir: Option<(StoreDir, TempDir)>,
}

impl TestStore {
    /// Creates an in-memory store.
    pub fn memory() -> Self {
        let clock = test_clock();
        let store = LocalStore::open_in_memory(clock.clone()).expect("in-memory store");
        let queue = OperationQueue::open_in_memory(clock.clone()).expect("in-memory queue");
        Self::assemble(store, queue, clock, None)
    }

    /// Creates a store in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("temp directory");
        let dir = StoreDir::open(temp_dir.path(), true).expect("store directory");
        let clock = test_clock();
        let store = LocalStore::open_with_clock(&dir, StoreConfig::default(), clock.clone())
            .expect("file store");
        let queue = OperationQueue::open_with_clock(&dir, StoreConfig::default(), clock.clone())
            .expect("file queue");
        Self::assemble(store, queue, clock, Some((dir, temp_dir)))
    }

    fn assemble(
        store: LocalStore,
        queue: OperationQueue,
        clock: Arc<FixedClock>,
        dir: Option<(StoreDir, TempDir)>,
    ) -> Self {
        let store = Arc::new(store);
        let queue = Arc::new(queue);
        Self {
            writer: LocalWriter::new(store.clone(), queue.clone()),
            store,
            queue,
            clock,
            _dir: dir,
        }
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._dir.as_ref().map(|(dir, _)| dir.path())
    }
}

/// Runs a test against a fresh in-memory store.
pub fn with_test_store<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore) -> R,
{
    let local = TestStore::memory();
    f(&local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_is_wired() {
        with_test_store(|local| {
            let habit = local.writer.create_habit("Read", None).unwrap();
            assert_eq!(habit.created_date, day(0));
            assert_eq!(local.store.get_habits(true).len(), 1);
            assert_eq!(local.queue.get_queue_size(), 1);
            assert!(local.path().is_none());
        });
    }

    #[test]
    fn file_store_lives_in_temp_dir() {
        let local = TestStore::file();
        local.writer.create_habit("Read", None).unwrap();
        let path = local.path().unwrap();
        assert!(path.join("habits.log").exists());
        assert!(path.join("queue.log").exists());
    }

    #[test]
    fn day_offsets() {
        assert_eq!(day(-1), date(2025, 1, 14));
        assert_eq!(day(2), date(2025, 1, 17));
    }
}
