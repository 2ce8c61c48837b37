//! The local durable store.
//!
//! Three collections (habits, logs, metadata), each kept in memory and
//! journaled to its own backend. Logs carry secondary indexes by habit and
//! by date. Every save is one journal frame per collection touched, so it
//! is durable and atomic before the in-memory view changes.
//!
//! The store never queues sync operations itself; that is the job of
//! [`crate::LocalWriter`].

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::entity::{Entity, Habit, HabitStatus, LogEntry, Metadata, Record, METADATA_KEY};
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, Mutation};
use chrono::NaiveDate;
use habitsync_storage::{InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One journaled collection keyed by primary key.
struct Collection<T: Record> {
    journal: Journal<T>,
    records: BTreeMap<String, T>,
}

impl<T: Record> Collection<T> {
    fn open(backend: Box<dyn StorageBackend>, config: StoreConfig) -> CoreResult<Self> {
        let (journal, replayed) = Journal::<T>::open(T::COLLECTION, backend, config)?;
        let mut records = BTreeMap::new();
        for mutation in replayed {
            match mutation {
                Mutation::Put(record) => {
                    records.insert(record.key().to_owned(), record);
                }
                Mutation::Remove(key) => {
                    records.remove(&key);
                }
            }
        }
        tracing::debug!(collection = T::COLLECTION, records = records.len(), "collection loaded");
        Ok(Self { journal, records })
    }

    /// Writes the records that differ from what is stored and returns the
    /// previous versions of the ones written.
    fn put_all(&mut self, records: &[T]) -> CoreResult<Vec<(Option<T>, T)>> {
        let changed: Vec<&T> = records
            .iter()
            .filter(|r| self.records.get(r.key()) != Some(*r))
            .collect();
        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let batch: Vec<Mutation<&T>> = changed.iter().map(|r| Mutation::Put(*r)).collect();
        self.journal.append(&batch)?;

        let written = changed
            .into_iter()
            .map(|r| {
                let previous = self.records.insert(r.key().to_owned(), r.clone());
                (previous, r.clone())
            })
            .collect();

        self.journal
            .maybe_compact(self.records.len(), self.records.values());
        Ok(written)
    }

    fn clear(&mut self) -> CoreResult<()> {
        self.journal.rewrite(std::iter::empty())?;
        self.records.clear();
        Ok(())
    }

    fn get(&self, key: &str) -> Option<&T> {
        self.records.get(key)
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }
}

/// Log collection plus its secondary indexes.
struct LogCollection {
    rows: Collection<LogEntry>,
    by_habit: BTreeMap<String, BTreeSet<String>>,
    by_date: BTreeMap<NaiveDate, BTreeSet<String>>,
}

impl LogCollection {
    fn open(backend: Box<dyn StorageBackend>, config: StoreConfig) -> CoreResult<Self> {
        let rows = Collection::open(backend, config)?;
        let mut logs = Self {
            rows,
            by_habit: BTreeMap::new(),
            by_date: BTreeMap::new(),
        };
        let all: Vec<LogEntry> = logs.rows.values().cloned().collect();
        for log in &all {
            logs.index(log);
        }
        Ok(logs)
    }

    fn index(&mut self, log: &LogEntry) {
        self.by_habit
            .entry(log.habit_id.clone())
            .or_default()
            .insert(log.log_id.clone());
        self.by_date
            .entry(log.date)
            .or_default()
            .insert(log.log_id.clone());
    }

    fn unindex(&mut self, log: &LogEntry) {
        if let Some(ids) = self.by_habit.get_mut(&log.habit_id) {
            ids.remove(&log.log_id);
            if ids.is_empty() {
                self.by_habit.remove(&log.habit_id);
            }
        }
        if let Some(ids) = self.by_date.get_mut(&log.date) {
            ids.remove(&log.log_id);
            if ids.is_empty() {
                self.by_date.remove(&log.date);
            }
        }
    }

    fn put_all(&mut self, logs: &[LogEntry]) -> CoreResult<()> {
        for (previous, current) in self.rows.put_all(logs)? {
            if let Some(previous) = previous {
                self.unindex(&previous);
            }
            self.index(&current);
        }
        Ok(())
    }

    fn clear(&mut self) -> CoreResult<()> {
        self.rows.clear()?;
        self.by_habit.clear();
        self.by_date.clear();
        Ok(())
    }

    fn query(&self, habit_id: Option<&str>, date: Option<NaiveDate>) -> Vec<LogEntry> {
        let ids: Vec<&String> = match (habit_id, date) {
            (None, None) => return self.rows.values().cloned().collect(),
            (Some(habit_id), None) => self.by_habit.get(habit_id).into_iter().flatten().collect(),
            (None, Some(date)) => self.by_date.get(&date).into_iter().flatten().collect(),
            (Some(habit_id), Some(date)) => match (self.by_habit.get(habit_id), self.by_date.get(&date)) {
                (Some(for_habit), Some(on_date)) => for_habit.intersection(on_date).collect(),
                _ => Vec::new(),
            },
        };
        ids.into_iter()
            .filter_map(|id| self.rows.get(id))
            .cloned()
            .collect()
    }
}

/// Backends for the three entity collections.
pub struct StoreBackends {
    /// Habit journal.
    pub habits: Box<dyn StorageBackend>,
    /// Log entry journal.
    pub logs: Box<dyn StorageBackend>,
    /// Metadata journal.
    pub metadata: Box<dyn StorageBackend>,
}

impl StoreBackends {
    /// Fresh in-memory backends.
    pub fn in_memory() -> Self {
        Self {
            habits: Box::new(InMemoryBackend::new()),
            logs: Box::new(InMemoryBackend::new()),
            metadata: Box::new(InMemoryBackend::new()),
        }
    }
}

/// The local durable store for habits, logs and metadata.
///
/// # Thread Safety
///
/// Each collection sits behind its own lock. Multi-collection writes take
/// the locks in the fixed order habits, logs, metadata.
pub struct LocalStore {
    habits: RwLock<Collection<Habit>>,
    logs: RwLock<LogCollection>,
    metadata: RwLock<Collection<Metadata>>,
    clock: Arc<dyn Clock>,
}

impl LocalStore {
    /// Opens the store kept in `dir`.
    ///
    /// # Errors
    ///
    /// Initialization failures (unreadable or corrupt journals) are fatal
    /// and returned to the caller.
    pub fn open(dir: &StoreDir, config: StoreConfig) -> CoreResult<Self> {
        Self::open_with_clock(dir, config, Arc::new(SystemClock))
    }

    /// Opens the store kept in `dir` with an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`LocalStore::open`].
    pub fn open_with_clock(
        dir: &StoreDir,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let backends = StoreBackends {
            habits: Box::new(dir.habits_backend()?),
            logs: Box::new(dir.logs_backend()?),
            metadata: Box::new(dir.metadata_backend()?),
        };
        Self::open_with_backends(backends, config, clock)
    }

    /// Opens the store over explicit backends.
    ///
    /// # Errors
    ///
    /// Fails if any journal cannot be replayed.
    pub fn open_with_backends(
        backends: StoreBackends,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        Ok(Self {
            habits: RwLock::new(Collection::open(backends.habits, config.clone())?),
            logs: RwLock::new(LogCollection::open(backends.logs, config.clone())?),
            metadata: RwLock::new(Collection::open(backends.metadata, config)?),
            clock,
        })
    }

    /// Opens an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the durable variants.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> CoreResult<Self> {
        Self::open_with_backends(StoreBackends::in_memory(), StoreConfig::default(), clock)
    }

    /// Returns the clock used for `modified_date` bumps.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Upserts one entity.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write could not be made durable.
    pub fn save_entity(&self, entity: &Entity) -> CoreResult<()> {
        self.save_entities(std::slice::from_ref(entity))
    }

    /// Upserts many entities.
    ///
    /// The records of each collection are written as a single frame, so
    /// each collection sees all of its records or none.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; collections written before it keep
    /// their records.
    pub fn save_entities(&self, entities: &[Entity]) -> CoreResult<()> {
        let mut habits = Vec::new();
        let mut logs = Vec::new();
        let mut metadata = Vec::new();
        for entity in entities {
            match entity {
                Entity::Habit(habit) => habits.push(habit.clone()),
                Entity::Log(log) => logs.push(log.clone()),
                Entity::Metadata(meta) => metadata.push(meta.clone()),
            }
        }

        if !habits.is_empty() {
            self.save_habits(&habits)?;
        }
        if !logs.is_empty() {
            self.save_logs(&logs)?;
        }
        if let Some(last) = metadata.last() {
            self.save_metadata(last)?;
        }
        Ok(())
    }

    /// Upserts habits.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write could not be made durable.
    pub fn save_habits(&self, habits: &[Habit]) -> CoreResult<()> {
        self.habits.write().put_all(habits)?;
        Ok(())
    }

    /// Upserts log entries.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write could not be made durable.
    pub fn save_logs(&self, logs: &[LogEntry]) -> CoreResult<()> {
        self.logs.write().put_all(logs)
    }

    /// Replaces the metadata record.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write could not be made durable.
    pub fn save_metadata(&self, metadata: &Metadata) -> CoreResult<()> {
        self.metadata
            .write()
            .put_all(std::slice::from_ref(metadata))?;
        Ok(())
    }

    /// Reconciles habits against the stored set in one critical section.
    ///
    /// `merge` receives every stored habit and returns the records to write
    /// along with a result for the caller. Saves from other threads wait
    /// until the write lands, so none is overwritten by a stale read.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write could not be made durable.
    pub fn merge_habits<R>(&self, merge: impl FnOnce(Vec<Habit>) -> (Vec<Habit>, R)) -> CoreResult<R> {
        let mut habits = self.habits.write();
        let (changed, result) = merge(habits.values().cloned().collect());
        habits.put_all(&changed)?;
        Ok(result)
    }

    /// Log counterpart of [`LocalStore::merge_habits`].
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write could not be made durable.
    pub fn merge_logs<R>(
        &self,
        merge: impl FnOnce(Vec<LogEntry>) -> (Vec<LogEntry>, R),
    ) -> CoreResult<R> {
        let mut logs = self.logs.write();
        let (changed, result) = merge(logs.rows.values().cloned().collect());
        logs.put_all(&changed)?;
        Ok(result)
    }

    /// Returns one habit by id.
    pub fn get_habit(&self, habit_id: &str) -> Option<Habit> {
        self.habits.read().get(habit_id).cloned()
    }

    /// Returns habits sorted by `created_date`, optionally only active ones.
    pub fn get_habits(&self, active_only: bool) -> Vec<Habit> {
        let mut habits: Vec<Habit> = self
            .habits
            .read()
            .values()
            .filter(|h| !active_only || h.is_active())
            .cloned()
            .collect();
        habits.sort_by(|a, b| a.created_date.cmp(&b.created_date));
        habits
    }

    /// Returns log entries filtered by habit, date, both, or neither.
    pub fn get_logs(&self, habit_id: Option<&str>, date: Option<NaiveDate>) -> Vec<LogEntry> {
        self.logs.read().query(habit_id, date)
    }

    /// Returns the authoritative log for a (habit, date) pair.
    ///
    /// If a pull brought in a second row for the same pair, the one written
    /// last wins.
    pub fn get_log_for(&self, habit_id: &str, date: NaiveDate) -> Option<LogEntry> {
        self.get_logs(Some(habit_id), Some(date))
            .into_iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
    }

    /// Returns the metadata record, if any.
    pub fn get_metadata(&self) -> Option<Metadata> {
        self.metadata.read().get(METADATA_KEY).cloned()
    }

    /// Soft-deletes a habit: marks it inactive and bumps `modified_date`.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if no such habit exists.
    pub fn delete_habit(&self, habit_id: &str) -> CoreResult<Habit> {
        let mut habits = self.habits.write();
        let mut habit = habits
            .get(habit_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(Habit::COLLECTION, habit_id))?;

        habit.status = HabitStatus::Inactive;
        habit.modified_date = self.clock.today().max(habit.created_date);
        habits.put_all(std::slice::from_ref(&habit))?;
        tracing::debug!(habit_id, "habit deactivated");
        Ok(habit)
    }

    /// Erases every collection. Used on sign-out and reset.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the first collection that fails.
    pub fn clear_all(&self) -> CoreResult<()> {
        let mut habits = self.habits.write();
        let mut logs = self.logs.write();
        let mut metadata = self.metadata.write();
        habits.clear()?;
        logs.clear()?;
        metadata.clear()?;
        tracing::info!("local store cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 12, 9, 0, 0).unwrap()))
    }

    fn store() -> LocalStore {
        LocalStore::open_in_memory(clock()).unwrap()
    }

    fn habit(id: &str, created: u32) -> Habit {
        Habit {
            habit_id: id.into(),
            name: format!("habit {id}"),
            category: None,
            status: HabitStatus::Active,
            created_date: date(created),
            modified_date: date(created),
        }
    }

    fn log(id: &str, habit_id: &str, day: u32) -> LogEntry {
        LogEntry {
            log_id: id.into(),
            habit_id: habit_id.into(),
            date: date(day),
            status: crate::entity::LogStatus::Done,
            notes: None,
            timestamp: Some(Utc.with_ymd_and_hms(2025, 1, day, 20, 0, 0).unwrap()),
        }
    }

    #[test]
    fn save_is_idempotent() {
        let store = store();
        let h = habit("h1", 3);
        store.save_entity(&Entity::from(h.clone())).unwrap();
        store.save_entity(&Entity::from(h.clone())).unwrap();

        assert_eq!(store.get_habits(false), vec![h]);
        assert_eq!(store.habits.read().journal.frame_count(), 1);
    }

    #[test]
    fn habits_sorted_by_created_date() {
        let store = store();
        store
            .save_habits(&[habit("b", 9), habit("a", 2), habit("c", 5)])
            .unwrap();
        let ids: Vec<_> = store
            .get_habits(false)
            .into_iter()
            .map(|h| h.habit_id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn soft_delete_keeps_the_row() {
        let store = store();
        store.save_habits(&[habit("h1", 1), habit("h2", 2)]).unwrap();

        let deleted = store.delete_habit("h1").unwrap();
        assert_eq!(deleted.status, HabitStatus::Inactive);
        assert_eq!(deleted.modified_date, date(12));
        assert_eq!(deleted.created_date, date(1));

        let all = store.get_habits(false);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, HabitStatus::Inactive);

        let active = store.get_habits(true);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].habit_id, "h2");
    }

    #[test]
    fn delete_missing_habit_is_not_found() {
        let store = store();
        let err = store.delete_habit("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn log_queries_use_both_dimensions() {
        let store = store();
        store
            .save_logs(&[
                log("l1", "h1", 10),
                log("l2", "h1", 11),
                log("l3", "h2", 10),
            ])
            .unwrap();

        assert_eq!(store.get_logs(None, None).len(), 3);
        assert_eq!(store.get_logs(Some("h1"), None).len(), 2);
        assert_eq!(store.get_logs(None, Some(date(10))).len(), 2);
        let both = store.get_logs(Some("h1"), Some(date(10)));
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].log_id, "l1");
        assert!(store.get_logs(Some("h3"), None).is_empty());
    }

    #[test]
    fn updating_a_log_moves_its_index_entries() {
        let store = store();
        store.save_logs(&[log("l1", "h1", 10)]).unwrap();

        let mut moved = log("l1", "h1", 11);
        moved.habit_id = "h2".into();
        store.save_logs(&[moved]).unwrap();

        assert!(store.get_logs(Some("h1"), None).is_empty());
        assert!(store.get_logs(None, Some(date(10))).is_empty());
        assert_eq!(store.get_logs(Some("h2"), Some(date(11))).len(), 1);
    }

    #[test]
    fn latest_row_wins_for_a_pair() {
        let store = store();
        let older = log("l1", "h1", 10);
        let mut newer = log("l2", "h1", 10);
        newer.timestamp = Some(Utc.with_ymd_and_hms(2025, 1, 10, 22, 0, 0).unwrap());
        store.save_logs(&[older, newer]).unwrap();

        assert_eq!(store.get_log_for("h1", date(10)).unwrap().log_id, "l2");
    }

    #[test]
    fn merge_holds_off_concurrent_saves() {
        let store = Arc::new(store());
        store.save_logs(&[log("l1", "h1", 10)]).unwrap();

        let mut newer = log("l1", "h1", 10);
        newer.status = crate::entity::LogStatus::NotDone;
        newer.timestamp = Some(Utc.with_ymd_and_hms(2025, 1, 10, 23, 0, 0).unwrap());
        let save_newer = {
            let store = store.clone();
            let newer = newer.clone();
            move || store.save_logs(&[newer]).unwrap()
        };

        let mut saver = None;
        let seen = store
            .merge_logs(|local| {
                saver = Some(std::thread::spawn(save_newer));
                std::thread::sleep(std::time::Duration::from_millis(50));
                let seen = local.len();
                (local, seen)
            })
            .unwrap();
        saver.unwrap().join().unwrap();

        assert_eq!(seen, 1);
        assert_eq!(store.get_log_for("h1", date(10)), Some(newer));
    }

    #[test]
    fn metadata_is_a_single_record() {
        let store = store();
        assert!(store.get_metadata().is_none());

        store.save_metadata(&Metadata::new("u1", "r1")).unwrap();
        store.save_metadata(&Metadata::new("u1", "r2")).unwrap();
        assert_eq!(store.get_metadata().unwrap().remote_id, "r2");
    }

    #[test]
    fn clear_all_empties_every_collection() {
        let store = store();
        store
            .save_entities(&[
                habit("h1", 1).into(),
                log("l1", "h1", 10).into(),
                Metadata::new("u1", "r1").into(),
            ])
            .unwrap();

        store.clear_all().unwrap();
        assert!(store.get_habits(false).is_empty());
        assert!(store.get_logs(None, None).is_empty());
        assert!(store.get_metadata().is_none());
    }

    #[test]
    fn failed_write_is_reported_and_not_applied() {
        let habits = InMemoryBackend::new();
        let backends = StoreBackends {
            habits: Box::new(habits.clone()),
            logs: Box::new(InMemoryBackend::new()),
            metadata: Box::new(InMemoryBackend::new()),
        };
        let store = LocalStore::open_with_backends(backends, StoreConfig::default(), clock()).unwrap();

        habits.set_fail_writes(true);
        assert!(store.save_habits(&[habit("h1", 1)]).is_err());
        assert!(store.get_habit("h1").is_none());
    }

    #[test]
    fn contents_survive_reopen() {
        let habits = InMemoryBackend::new();
        let logs = InMemoryBackend::new();
        let metadata = InMemoryBackend::new();
        let open = || {
            let backends = StoreBackends {
                habits: Box::new(habits.clone()),
                logs: Box::new(logs.clone()),
                metadata: Box::new(metadata.clone()),
            };
            LocalStore::open_with_backends(backends, StoreConfig::default(), clock()).unwrap()
        };

        {
            let store = open();
            store.save_habits(&[habit("h1", 1)]).unwrap();
            store.save_logs(&[log("l1", "h1", 10)]).unwrap();
            store.delete_habit("h1").unwrap();
        }

        let store = open();
        assert_eq!(store.get_habit("h1").unwrap().status, HabitStatus::Inactive);
        assert_eq!(store.get_logs(Some("h1"), Some(date(10))).len(), 1);
    }

    #[test]
    fn failed_compaction_does_not_fail_the_save() {
        let logs = InMemoryBackend::new();
        let backends = StoreBackends {
            habits: Box::new(InMemoryBackend::new()),
            logs: Box::new(logs.clone()),
            metadata: Box::new(InMemoryBackend::new()),
        };
        let config = StoreConfig::new().with_compaction(1, 1);
        let store = LocalStore::open_with_backends(backends, config, clock()).unwrap();
        logs.set_fail_replace(true);

        store.save_logs(&[log("l1", "h1", 10)]).unwrap();
        let mut updated = log("l1", "h1", 10);
        updated.status = crate::entity::LogStatus::NotDone;
        store.save_logs(&[updated]).unwrap();
        store.save_logs(&[log("l2", "h1", 11)]).unwrap();

        assert_eq!(store.get_logs(Some("h1"), None).len(), 2);
        assert_eq!(store.get_logs(None, Some(date(11))).len(), 1);
        assert_eq!(
            store.get_log_for("h1", date(10)).unwrap().status,
            crate::entity::LogStatus::NotDone
        );

        let reopened = LocalStore::open_with_backends(
            StoreBackends {
                habits: Box::new(InMemoryBackend::new()),
                logs: Box::new(logs.clone()),
                metadata: Box::new(InMemoryBackend::new()),
            },
            StoreConfig::default(),
            clock(),
        )
        .unwrap();
        assert_eq!(reopened.get_logs(Some("h1"), None).len(), 2);
    }

    #[test]
    fn compaction_keeps_live_records() {
        let backend = InMemoryBackend::new();
        let backends = StoreBackends {
            habits: Box::new(backend.clone()),
            logs: Box::new(InMemoryBackend::new()),
            metadata: Box::new(InMemoryBackend::new()),
        };
        let config = StoreConfig::new().with_compaction(4, 2);
        let store = LocalStore::open_with_backends(backends, config, clock()).unwrap();

        let mut h = habit("h1", 1);
        for i in 0..20 {
            h.name = format!("name {i}");
            store.save_habits(&[h.clone()]).unwrap();
        }
        assert!(store.habits.read().journal.frame_count() < 4);

        let reopened = LocalStore::open_with_backends(
            StoreBackends {
                habits: Box::new(backend.clone()),
                logs: Box::new(InMemoryBackend::new()),
                metadata: Box::new(InMemoryBackend::new()),
            },
            StoreConfig::default(),
            clock(),
        )
        .unwrap();
        assert_eq!(reopened.get_habit("h1").unwrap().name, "name 19");
    }
}
