//! The remote datastore contract.
//!
//! The coordinator only depends on [`RemoteGateway`]. Real deployments wrap
//! their datastore client in it; [`MemoryGateway`] is an in-process remote
//! used by tests and demos, with call recording and failure injection.

use crate::error::GatewayError;
use async_trait::async_trait;
use habitsync_core::{Habit, HabitStatus, LogEntry, Metadata};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// Typed CRUD access to the remote datastore.
///
/// Every call may fail transiently (network, server) or permanently
/// (validation, authorization, missing record); see
/// [`GatewayError::is_retryable`].
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Inserts a new habit.
    async fn create_habit(&self, habit: &Habit) -> Result<(), GatewayError>;

    /// Overwrites an existing habit.
    async fn update_habit(&self, habit: &Habit) -> Result<(), GatewayError>;

    /// Soft-deletes a habit: the remote row is marked inactive with the
    /// snapshot's `modified_date`.
    async fn delete_habit(&self, habit: &Habit) -> Result<(), GatewayError>;

    /// Inserts a new log row.
    async fn create_log(&self, log: &LogEntry) -> Result<(), GatewayError>;

    /// Overwrites an existing log row.
    async fn update_log(&self, log: &LogEntry) -> Result<(), GatewayError>;

    /// Removes a log row.
    async fn delete_log(&self, log_id: &str) -> Result<(), GatewayError>;

    /// Returns every habit of the signed-in user.
    async fn get_habits(&self) -> Result<Vec<Habit>, GatewayError>;

    /// Returns every log row of the signed-in user.
    async fn get_logs(&self) -> Result<Vec<LogEntry>, GatewayError>;

    /// Returns the user's metadata record, if any.
    async fn get_metadata(&self) -> Result<Option<Metadata>, GatewayError>;

    /// Creates or replaces the user's metadata record.
    async fn update_metadata(&self, metadata: &Metadata) -> Result<(), GatewayError>;
}

/// Gateway methods, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayMethod {
    /// [`RemoteGateway::create_habit`]
    CreateHabit,
    /// [`RemoteGateway::update_habit`]
    UpdateHabit,
    /// [`RemoteGateway::delete_habit`]
    DeleteHabit,
    /// [`RemoteGateway::create_log`]
    CreateLog,
    /// [`RemoteGateway::update_log`]
    UpdateLog,
    /// [`RemoteGateway::delete_log`]
    DeleteLog,
    /// [`RemoteGateway::get_habits`]
    GetHabits,
    /// [`RemoteGateway::get_logs`]
    GetLogs,
    /// [`RemoteGateway::get_metadata`]
    GetMetadata,
    /// [`RemoteGateway::update_metadata`]
    UpdateMetadata,
}

impl fmt::Display for GatewayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GatewayMethod::CreateHabit => "create_habit",
            GatewayMethod::UpdateHabit => "update_habit",
            GatewayMethod::DeleteHabit => "delete_habit",
            GatewayMethod::CreateLog => "create_log",
            GatewayMethod::UpdateLog => "update_log",
            GatewayMethod::DeleteLog => "delete_log",
            GatewayMethod::GetHabits => "get_habits",
            GatewayMethod::GetLogs => "get_logs",
            GatewayMethod::GetMetadata => "get_metadata",
            GatewayMethod::UpdateMetadata => "update_metadata",
        })
    }
}

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    /// Method invoked.
    pub method: GatewayMethod,
    /// Entity targeted by a point write.
    pub entity_id: Option<String>,
}

#[derive(Default)]
struct RemoteState {
    habits: BTreeMap<String, Habit>,
    logs: BTreeMap<String, LogEntry>,
    metadata: Option<Metadata>,
}

#[derive(Default)]
struct Faults {
    next: HashMap<GatewayMethod, VecDeque<GatewayError>>,
    entities: HashMap<String, GatewayError>,
}

/// An in-process remote store.
///
/// Point writes follow the remote's row semantics: creates upsert, updates
/// and deletes of a missing row fail with [`GatewayError::NotFound`].
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<RemoteState>,
    calls: Mutex<Vec<GatewayCall>>,
    faults: Mutex<Faults>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryGateway {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds remote habits without recording calls.
    pub fn seed_habits(&self, habits: impl IntoIterator<Item = Habit>) {
        let mut state = self.state.lock();
        for habit in habits {
            state.habits.insert(habit.habit_id.clone(), habit);
        }
    }

    /// Seeds remote log rows without recording calls.
    pub fn seed_logs(&self, logs: impl IntoIterator<Item = LogEntry>) {
        let mut state = self.state.lock();
        for log in logs {
            state.logs.insert(log.log_id.clone(), log);
        }
    }

    /// Seeds the remote metadata record.
    pub fn seed_metadata(&self, metadata: Metadata) {
        self.state.lock().metadata = Some(metadata);
    }

    /// Fails the next call to `method` with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, method: GatewayMethod, error: GatewayError) {
        self.faults
            .lock()
            .next
            .entry(method)
            .or_default()
            .push_back(error);
    }

    /// Fails every point write targeting `entity_id` until cleared.
    pub fn fail_entity(&self, entity_id: impl Into<String>, error: GatewayError) {
        self.faults.lock().entities.insert(entity_id.into(), error);
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        let mut faults = self.faults.lock();
        faults.next.clear();
        faults.entities.clear();
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Returns the recorded calls in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns how often `method` was called.
    pub fn calls_to(&self, method: GatewayMethod) -> usize {
        self.calls.lock().iter().filter(|c| c.method == method).count()
    }

    /// Forgets recorded calls.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Returns a remote habit.
    pub fn habit(&self, habit_id: &str) -> Option<Habit> {
        self.state.lock().habits.get(habit_id).cloned()
    }

    /// Returns a remote log row.
    pub fn log(&self, log_id: &str) -> Option<LogEntry> {
        self.state.lock().logs.get(log_id).cloned()
    }

    /// Returns the remote metadata record.
    pub fn metadata(&self) -> Option<Metadata> {
        self.state.lock().metadata.clone()
    }

    /// Records the call, waits out the latency and applies injected faults.
    async fn enter(&self, method: GatewayMethod, entity_id: Option<&str>) -> Result<(), GatewayError> {
        self.calls.lock().push(GatewayCall {
            method,
            entity_id: entity_id.map(str::to_owned),
        });

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self.faults.lock();
        if let Some(error) = faults.next.get_mut(&method).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if let Some(error) = entity_id.and_then(|id| faults.entities.get(id)) {
            return Err(error.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn create_habit(&self, habit: &Habit) -> Result<(), GatewayError> {
        self.enter(GatewayMethod::CreateHabit, Some(&habit.habit_id)).await?;
        self.state
            .lock()
            .habits
            .insert(habit.habit_id.clone(), habit.clone());
        Ok(())
    }

    async fn update_habit(&self, habit: &Habit) -> Result<(), GatewayError> {
        self.enter(GatewayMethod::UpdateHabit, Some(&habit.habit_id)).await?;
        let mut state = self.state.lock();
        let row = state
            .habits
            .get_mut(&habit.habit_id)
            .ok_or_else(|| GatewayError::not_found("habit", &habit.habit_id))?;
        *row = habit.clone();
        Ok(())
    }

    async fn delete_habit(&self, habit: &Habit) -> Result<(), GatewayError> {
        self.enter(GatewayMethod::DeleteHabit, Some(&habit.habit_id)).await?;
        let mut state = self.state.lock();
        let row = state
            .habits
            .get_mut(&habit.habit_id)
            .ok_or_else(|| GatewayError::not_found("habit", &habit.habit_id))?;
        row.status = HabitStatus::Inactive;
        row.modified_date = habit.modified_date;
        Ok(())
    }

    async fn create_log(&self, log: &LogEntry) -> Result<(), GatewayError> {
        self.enter(GatewayMethod::CreateLog, Some(&log.log_id)).await?;
        self.state.lock().logs.insert(log.log_id.clone(), log.clone());
        Ok(())
    }

    async fn update_log(&self, log: &LogEntry) -> Result<(), GatewayError> {
        self.enter(GatewayMethod::UpdateLog, Some(&log.log_id)).await?;
        let mut state = self.state.lock();
        let row = state
            .logs
            .get_mut(&log.log_id)
            .ok_or_else(|| GatewayError::not_found("log", &log.log_id))?;
        *row = log.clone();
        Ok(())
    }

    async fn delete_log(&self, log_id: &str) -> Result<(), GatewayError> {
        self.enter(GatewayMethod::DeleteLog, Some(log_id)).await?;
        self.state
            .lock()
            .logs
            .remove(log_id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::not_found("log", log_id))
    }

    async fn get_habits(&self) -> Result<Vec<Habit>, GatewayError> {
        self.enter(GatewayMethod::GetHabits, None).await?;
        Ok(self.state.lock().habits.values().cloned().collect())
    }

    async fn get_logs(&self) -> Result<Vec<LogEntry>, GatewayError> {
        self.enter(GatewayMethod::GetLogs, None).await?;
        Ok(self.state.lock().logs.values().cloned().collect())
    }

    async fn get_metadata(&self) -> Result<Option<Metadata>, GatewayError> {
        self.enter(GatewayMethod::GetMetadata, None).await?;
        Ok(self.state.lock().metadata.clone())
    }

    async fn update_metadata(&self, metadata: &Metadata) -> Result<(), GatewayError> {
        self.enter(GatewayMethod::UpdateMetadata, None).await?;
        self.state.lock().metadata = Some(metadata.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn habit(id: &str) -> Habit {
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        Habit {
            habit_id: id.into(),
            name: id.into(),
            category: None,
            status: HabitStatus::Active,
            created_date: day,
            modified_date: day,
        }
    }

    #[tokio::test]
    async fn point_writes_follow_row_semantics() {
        let gateway = MemoryGateway::new();
        let h = habit("h1");

        let err = gateway.update_habit(&h).await.unwrap_err();
        assert_eq!(err, GatewayError::not_found("habit", "h1"));

        gateway.create_habit(&h).await.unwrap();
        gateway.delete_habit(&h).await.unwrap();
        assert_eq!(gateway.habit("h1").unwrap().status, HabitStatus::Inactive);
        assert!(gateway.delete_log("missing").await.is_err());

        assert_eq!(gateway.calls_to(GatewayMethod::UpdateHabit), 1);
        assert_eq!(gateway.call_count(), 4);
    }

    #[tokio::test]
    async fn injected_failures() {
        let gateway = MemoryGateway::new();
        gateway.fail_next(
            GatewayMethod::GetHabits,
            GatewayError::Transient("timeout".into()),
        );
        assert!(gateway.get_habits().await.is_err());
        assert!(gateway.get_habits().await.is_ok());

        gateway.fail_entity("h2", GatewayError::Rejected("nope".into()));
        assert!(gateway.create_habit(&habit("h1")).await.is_ok());
        assert!(gateway.create_habit(&habit("h2")).await.is_err());
        assert!(gateway.habit("h2").is_none());

        gateway.clear_failures();
        assert!(gateway.create_habit(&habit("h2")).await.is_ok());
    }
}
