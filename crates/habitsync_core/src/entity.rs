//! Habit, log and metadata records.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A record that lives in one of the local collections.
pub trait Record: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name, used in logs and errors.
    const COLLECTION: &'static str;

    /// Primary key.
    fn key(&self) -> &str;
}

/// Key of the single metadata record.
pub const METADATA_KEY: &str = "metadata";

/// Lifecycle of a habit. Habits are never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitStatus {
    /// Shown and loggable.
    Active,
    /// Soft-deleted; history is kept.
    Inactive,
}

/// A user-defined recurring activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    /// Client-generated identifier.
    pub habit_id: String,
    /// Display name, trimmed.
    pub name: String,
    /// Optional grouping, trimmed; never `Some("")`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Active or soft-deleted.
    pub status: HabitStatus,
    /// Set once at creation.
    pub created_date: NaiveDate,
    /// Bumped on every mutation; the conflict stamp for habits.
    pub modified_date: NaiveDate,
}

impl Habit {
    /// Returns true if the habit is active.
    pub fn is_active(&self) -> bool {
        self.status == HabitStatus::Active
    }
}

impl Record for Habit {
    const COLLECTION: &'static str = "habit";

    fn key(&self) -> &str {
        &self.habit_id
    }
}

/// What happened to a habit on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// Completed.
    Done,
    /// Explicitly not completed.
    NotDone,
    /// Nothing recorded; the implicit default.
    NoData,
}

/// One habit's record for one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Identifier of this row.
    pub log_id: String,
    /// The habit logged; survives habit deactivation.
    pub habit_id: String,
    /// The day logged.
    pub date: NaiveDate,
    /// Outcome for the day.
    pub status: LogStatus,
    /// Day notes, shared by every row of the same date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Time of the last write; the conflict stamp for logs. Rows written by
    /// older clients may lack it.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Record for LogEntry {
    const COLLECTION: &'static str = "log";

    fn key(&self) -> &str {
        &self.log_id
    }
}

/// The per-user synchronization record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Schema version of the remote store.
    pub sheet_version: u32,
    /// End of the last successful push cycle.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Owner of the data.
    pub user_id: String,
    /// Identifier of the remote store holding the user's data.
    pub remote_id: String,
}

impl Metadata {
    /// Current remote schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Creates metadata for a freshly connected user.
    pub fn new(user_id: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            sheet_version: Self::CURRENT_VERSION,
            last_sync: None,
            user_id: user_id.into(),
            remote_id: remote_id.into(),
        }
    }
}

impl Record for Metadata {
    const COLLECTION: &'static str = "metadata";

    fn key(&self) -> &str {
        METADATA_KEY
    }
}

/// Kind of entity an operation targets.
///
/// Persisted as a lowercase string. Names this build does not know are kept
/// in [`EntityType::Other`] so a queue written by a newer client still loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    /// [`Habit`] records.
    Habit,
    /// [`LogEntry`] records.
    Log,
    /// The [`Metadata`] record.
    Metadata,
    /// Anything else.
    Other(String),
}

impl EntityType {
    /// Returns the persisted name.
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Habit => "habit",
            EntityType::Log => "log",
            EntityType::Metadata => "metadata",
            EntityType::Other(name) => name,
        }
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "habit" => EntityType::Habit,
            "log" => EntityType::Log,
            "metadata" => EntityType::Metadata,
            _ => EntityType::Other(name),
        }
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_owned()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any record the local store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum Entity {
    /// A habit.
    Habit(Habit),
    /// A log row.
    Log(LogEntry),
    /// The metadata record.
    Metadata(Metadata),
}

impl Entity {
    /// Returns the entity's kind.
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Habit(_) => EntityType::Habit,
            Entity::Log(_) => EntityType::Log,
            Entity::Metadata(_) => EntityType::Metadata,
        }
    }

    /// Returns the primary key.
    pub fn id(&self) -> &str {
        match self {
            Entity::Habit(habit) => habit.key(),
            Entity::Log(log) => log.key(),
            Entity::Metadata(metadata) => metadata.key(),
        }
    }

    /// Returns the full JSON snapshot queued for the remote store.
    pub fn snapshot(&self) -> CoreResult<serde_json::Value> {
        match self {
            Entity::Habit(habit) => to_snapshot(habit),
            Entity::Log(log) => to_snapshot(log),
            Entity::Metadata(metadata) => to_snapshot(metadata),
        }
    }
}

impl From<Habit> for Entity {
    fn from(habit: Habit) -> Self {
        Entity::Habit(habit)
    }
}

impl From<LogEntry> for Entity {
    fn from(log: LogEntry) -> Self {
        Entity::Log(log)
    }
}

impl From<Metadata> for Entity {
    fn from(metadata: Metadata) -> Self {
        Entity::Metadata(metadata)
    }
}

/// Serializes a record into a queue snapshot.
pub fn to_snapshot<T: Serialize>(record: &T) -> CoreResult<serde_json::Value> {
    serde_json::to_value(record).map_err(CoreError::codec)
}

/// Reads a record back out of a queue snapshot.
pub fn from_snapshot<T: DeserializeOwned>(data: &serde_json::Value) -> CoreResult<T> {
    T::deserialize(data).map_err(CoreError::codec)
}

/// Generates a fresh record identifier.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn entity_type_names() {
        assert_eq!(EntityType::from("habit".to_string()), EntityType::Habit);
        assert_eq!(EntityType::from("log".to_string()), EntityType::Log);
        assert_eq!(
            EntityType::from("reminder".to_string()),
            EntityType::Other("reminder".into())
        );
        assert_eq!(EntityType::Metadata.to_string(), "metadata");
    }

    #[test]
    fn habit_snapshot_shape() {
        let habit = Habit {
            habit_id: "h1".into(),
            name: "Run".into(),
            category: None,
            status: HabitStatus::Active,
            created_date: date(2025, 1, 1),
            modified_date: date(2025, 1, 2),
        };

        let snapshot = Entity::from(habit.clone()).snapshot().unwrap();
        assert_eq!(snapshot["habit_id"], "h1");
        assert_eq!(snapshot["status"], "active");
        assert_eq!(snapshot["created_date"], "2025-01-01");
        assert!(snapshot.get("category").is_none());

        let back: Habit = from_snapshot(&snapshot).unwrap();
        assert_eq!(back, habit);
    }

    #[test]
    fn log_without_timestamp_decodes() {
        let data = serde_json::json!({
            "log_id": "l1",
            "habit_id": "h1",
            "date": "2025-01-10",
            "status": "not_done",
        });
        let log: LogEntry = from_snapshot(&data).unwrap();
        assert_eq!(log.status, LogStatus::NotDone);
        assert_eq!(log.timestamp, None);
        assert_eq!(log.notes, None);
    }

    #[test]
    fn malformed_snapshot_is_codec_error() {
        let data = serde_json::json!({ "habit_id": "h1" });
        let err = from_snapshot::<Habit>(&data).unwrap_err();
        assert!(matches!(err, CoreError::Codec(_)));
    }

    #[test]
    fn metadata_key_is_fixed() {
        let metadata = Metadata::new("user-1", "remote-1");
        assert_eq!(Entity::from(metadata).id(), METADATA_KEY);
    }
}
