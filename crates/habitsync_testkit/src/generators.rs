//! Property-based test generators using proptest.
//!
//! Strategies produce records that already satisfy the write-boundary
//! rules, so properties can focus on sync behavior.

use crate::fixtures::{date, test_now};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use habitsync_core::{Habit, HabitStatus, LogEntry, LogStatus, OperationType};
use proptest::prelude::*;

/// Strategy for valid habit names.
pub fn habit_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,30}[A-Za-z0-9]")
        .expect("Invalid regex")
}

/// Strategy for dates in January 2025.
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1u32..=31).prop_map(|d| date(2025, 1, d))
}

/// Strategy for instants within a day of the test clock.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (-86_400i64..86_400).prop_map(|secs| test_now() + Duration::seconds(secs))
}

/// Strategy for habit status.
pub fn habit_status_strategy() -> impl Strategy<Value = HabitStatus> {
    prop_oneof![Just(HabitStatus::Active), Just(HabitStatus::Inactive)]
}

/// Strategy for log status.
pub fn log_status_strategy() -> impl Strategy<Value = LogStatus> {
    prop_oneof![
        Just(LogStatus::Done),
        Just(LogStatus::NotDone),
        Just(LogStatus::NoData),
    ]
}

/// Strategy for queue operation types.
pub fn operation_type_strategy() -> impl Strategy<Value = OperationType> {
    prop_oneof![
        Just(OperationType::Create),
        Just(OperationType::Update),
        Just(OperationType::Delete),
    ]
}

/// Strategy for habits whose id is drawn from `id_space` values.
pub fn habit_strategy(id_space: u8) -> impl Strategy<Value = Habit> {
    (
        0..id_space.max(1),
        habit_name_strategy(),
        habit_status_strategy(),
        date_strategy(),
        0i64..10,
    )
        .prop_map(|(id, name, status, created, age)| Habit {
            habit_id: format!("habit-{id}"),
            name,
            category: None,
            status,
            created_date: created,
            modified_date: created + Duration::days(age),
        })
}

/// Strategy for log rows whose id is drawn from `id_space` values. About
/// one in eight rows has no timestamp.
pub fn log_entry_strategy(id_space: u8) -> impl Strategy<Value = LogEntry> {
    (
        0..id_space.max(1),
        0u8..4,
        date_strategy(),
        log_status_strategy(),
        prop::option::weighted(0.875, timestamp_strategy()),
    )
        .prop_map(|(id, habit, date, status, timestamp)| LogEntry {
            log_id: format!("log-{id}"),
            habit_id: format!("habit-{habit}"),
            date,
            status,
            notes: None,
            timestamp,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use habitsync_core::validate;

    proptest! {
        #[test]
        fn generated_names_pass_validation(name in habit_name_strategy()) {
            prop_assert!(validate::habit_name(&name).is_ok());
        }

        #[test]
        fn generated_habits_are_well_formed(habit in habit_strategy(8)) {
            prop_assert!(habit.modified_date >= habit.created_date);
            prop_assert!(habit.habit_id.starts_with("habit-"));
        }
    }
}
