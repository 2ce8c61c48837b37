//! The write boundary the UI layer calls.
//!
//! Every method validates its input, writes the local store, then enqueues
//! the full snapshot of the written entity. Validation failures return
//! before anything is stored or queued.

use crate::entity::{Entity, EntityType, Habit, HabitStatus, LogEntry, LogStatus, Record};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::queue::{OperationQueue, OperationType};
use crate::store::LocalStore;
use crate::{entity, validate};
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::Arc;

/// Validating producer of local mutations and their queued operations.
pub struct LocalWriter {
    store: Arc<LocalStore>,
    queue: Arc<OperationQueue>,
    // Serializes check-then-write sequences such as name uniqueness.
    write_lock: Mutex<()>,
}

impl LocalWriter {
    /// Creates a writer over a store and its queue.
    pub fn new(store: Arc<LocalStore>, queue: Arc<OperationQueue>) -> Self {
        Self {
            store,
            queue,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the store written to.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Returns the queue written to.
    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    fn enqueue(&self, operation_type: OperationType, entity: Entity) -> CoreResult<()> {
        let entity_type: EntityType = entity.entity_type();
        let data = entity.snapshot()?;
        self.queue
            .add_to_queue(operation_type, entity_type, entity.id(), data)?;
        Ok(())
    }

    fn ensure_unique_name(&self, name: &str, except: Option<&str>) -> CoreResult<()> {
        let taken = self
            .store
            .get_habits(true)
            .into_iter()
            .any(|h| Some(h.habit_id.as_str()) != except && validate::same_name(&h.name, name));
        if taken {
            return Err(ValidationError::DuplicateName(name.to_owned()).into());
        }
        Ok(())
    }

    fn existing_habit(&self, habit_id: &str) -> CoreResult<Habit> {
        self.store
            .get_habit(habit_id)
            .ok_or_else(|| CoreError::not_found(Habit::COLLECTION, habit_id))
    }

    /// Creates an active habit.
    ///
    /// # Errors
    ///
    /// Validation errors for the name or category, including a name already
    /// used by another active habit; storage errors otherwise.
    pub fn create_habit(&self, name: &str, category: Option<&str>) -> CoreResult<Habit> {
        let name = validate::habit_name(name)?;
        let category = validate::category(category)?;

        let _guard = self.write_lock.lock();
        self.ensure_unique_name(&name, None)?;

        let today = self.store.clock().today();
        let habit = Habit {
            habit_id: entity::new_record_id(),
            name,
            category,
            status: HabitStatus::Active,
            created_date: today,
            modified_date: today,
        };
        self.store.save_habits(std::slice::from_ref(&habit))?;
        self.enqueue(OperationType::Create, habit.clone().into())?;
        tracing::debug!(habit_id = %habit.habit_id, "habit created");
        Ok(habit)
    }

    /// Renames or recategorizes an active habit.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InactiveHabit` for a deactivated one,
    /// and the same validation errors as [`LocalWriter::create_habit`].
    pub fn update_habit(
        &self,
        habit_id: &str,
        name: &str,
        category: Option<&str>,
    ) -> CoreResult<Habit> {
        let name = validate::habit_name(name)?;
        let category = validate::category(category)?;

        let _guard = self.write_lock.lock();
        let mut habit = self.existing_habit(habit_id)?;
        if !habit.is_active() {
            return Err(ValidationError::InactiveHabit(habit_id.to_owned()).into());
        }
        self.ensure_unique_name(&name, Some(habit_id))?;

        habit.name = name;
        habit.category = category;
        habit.modified_date = self.store.clock().today().max(habit.created_date);
        self.store.save_habits(std::slice::from_ref(&habit))?;
        self.enqueue(OperationType::Update, habit.clone().into())?;
        Ok(habit)
    }

    /// Soft-deletes a habit; its logs are kept.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id; storage errors otherwise.
    pub fn delete_habit(&self, habit_id: &str) -> CoreResult<Habit> {
        let _guard = self.write_lock.lock();
        let habit = self.store.delete_habit(habit_id)?;
        self.enqueue(OperationType::Delete, habit.clone().into())?;
        Ok(habit)
    }

    /// Brings a deactivated habit back. Already active habits are returned
    /// unchanged and nothing is queued.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id; `DuplicateName` if an active habit has
    /// taken the name in the meantime.
    pub fn reactivate_habit(&self, habit_id: &str) -> CoreResult<Habit> {
        let _guard = self.write_lock.lock();
        let mut habit = self.existing_habit(habit_id)?;
        if habit.is_active() {
            return Ok(habit);
        }
        self.ensure_unique_name(&habit.name, Some(habit_id))?;

        habit.status = HabitStatus::Active;
        habit.modified_date = self.store.clock().today().max(habit.created_date);
        self.store.save_habits(std::slice::from_ref(&habit))?;
        self.enqueue(OperationType::Update, habit.clone().into())?;
        Ok(habit)
    }

    /// Records a habit's outcome for a day.
    ///
    /// Writing the same (habit, date) pair again updates the existing row.
    /// `notes: None` keeps the day's current notes. A [`LogStatus::NoData`]
    /// write with no existing row stores nothing and returns `None`.
    ///
    /// # Errors
    ///
    /// `FutureDate` or `DateOutsideWindow` for the date, `NotesTooLong`,
    /// `NotFound` for an unknown habit and `InactiveHabit` for a deactivated
    /// one.
    pub fn log_habit(
        &self,
        habit_id: &str,
        date: NaiveDate,
        status: LogStatus,
        notes: Option<&str>,
    ) -> CoreResult<Option<LogEntry>> {
        let clock = self.store.clock().clone();
        validate::log_date(date, clock.today())?;
        let notes = notes.map(|n| validate::notes(Some(n))).transpose()?;

        let _guard = self.write_lock.lock();
        if !self.existing_habit(habit_id)?.is_active() {
            return Err(ValidationError::InactiveHabit(habit_id.to_owned()).into());
        }

        let existing = self.store.get_log_for(habit_id, date);
        if existing.is_none() && status == LogStatus::NoData {
            return Ok(None);
        }
        let day_notes = match notes {
            Some(notes) => notes,
            None => self.day_notes(date),
        };

        let (operation_type, log) = match existing {
            Some(mut log) => {
                log.status = status;
                log.notes = day_notes;
                log.timestamp = Some(clock.now());
                (OperationType::Update, log)
            }
            None => (
                OperationType::Create,
                LogEntry {
                    log_id: entity::new_record_id(),
                    habit_id: habit_id.to_owned(),
                    date,
                    status,
                    notes: day_notes,
                    timestamp: Some(clock.now()),
                },
            ),
        };

        self.store.save_logs(std::slice::from_ref(&log))?;
        self.enqueue(operation_type, log.clone().into())?;
        Ok(Some(log))
    }

    fn day_notes(&self, date: NaiveDate) -> Option<String> {
        self.store
            .get_logs(None, Some(date))
            .into_iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
            .and_then(|log| log.notes)
    }

    /// Sets the shared notes on every log row of `date`. Returns the rows
    /// that changed; a date with no rows changes nothing.
    ///
    /// # Errors
    ///
    /// Date window and notes length validation errors; storage errors.
    pub fn set_day_notes(&self, date: NaiveDate, notes: Option<&str>) -> CoreResult<Vec<LogEntry>> {
        let clock = self.store.clock().clone();
        validate::log_date(date, clock.today())?;
        let notes = validate::notes(notes)?;

        let _guard = self.write_lock.lock();
        let now = clock.now();
        let changed: Vec<LogEntry> = self
            .store
            .get_logs(None, Some(date))
            .into_iter()
            .filter(|log| log.notes != notes)
            .map(|mut log| {
                log.notes = notes.clone();
                log.timestamp = Some(now);
                log
            })
            .collect();
        if changed.is_empty() {
            return Ok(changed);
        }

        self.store.save_logs(&changed)?;
        for log in &changed {
            self.enqueue(OperationType::Update, log.clone().into())?;
        }
        Ok(changed)
    }
}
