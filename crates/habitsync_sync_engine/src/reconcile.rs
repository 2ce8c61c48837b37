//! Last-write-wins reconciliation of pulled records.

use chrono::{DateTime, NaiveDate, Utc};
use habitsync_core::{Habit, LogEntry, Record};
use std::collections::HashMap;

/// A record carrying a conflict stamp.
pub trait Versioned: Record {
    /// Ordered stamp compared between local and remote copies.
    type Stamp: Ord;

    /// Returns the stamp, or `None` if the record has none.
    fn stamp(&self) -> Option<Self::Stamp>;
}

impl Versioned for Habit {
    type Stamp = NaiveDate;

    fn stamp(&self) -> Option<NaiveDate> {
        Some(self.modified_date)
    }
}

impl Versioned for LogEntry {
    type Stamp = DateTime<Utc>;

    fn stamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

/// How a reconciliation pass decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Local records with no remote counterpart.
    pub local_only: usize,
    /// Conflicts where the local copy was kept.
    pub kept_local: usize,
    /// Conflicts where the remote copy replaced the local one.
    pub adopted_remote: usize,
    /// Remote records added locally.
    pub added_remote: usize,
}

/// The merged collection and how it was produced.
#[derive(Debug, Clone)]
pub struct Reconciled<T> {
    /// Union of both sides, one record per id. Local order first, then
    /// remote-only records in remote order.
    pub records: Vec<T>,
    /// The remote records that must be written locally: adopted conflicts
    /// and remote-only additions, in the order they were decided.
    pub changed: Vec<T>,
    /// Decision counts.
    pub stats: ReconcileStats,
}

/// Merges `remote` into `local`, keyed by primary key.
///
/// A record present on both sides keeps the local copy unless the remote
/// stamp is strictly newer. A missing stamp on either side keeps local.
pub fn last_write_wins<T: Versioned>(local: Vec<T>, remote: Vec<T>) -> Reconciled<T> {
    let mut remote_by_id: HashMap<String, T> = HashMap::with_capacity(remote.len());
    let mut remote_order = Vec::with_capacity(remote.len());
    for record in remote {
        let key = record.key().to_owned();
        if remote_by_id.insert(key.clone(), record).is_none() {
            remote_order.push(key);
        }
    }

    let mut stats = ReconcileStats::default();
    let mut records = Vec::with_capacity(local.len() + remote_by_id.len());
    let mut changed = Vec::new();
    for local in local {
        let chosen = match remote_by_id.remove(local.key()) {
            None => {
                stats.local_only += 1;
                local
            }
            Some(remote) => match (local.stamp(), remote.stamp()) {
                (Some(l), Some(r)) if r > l => {
                    stats.adopted_remote += 1;
                    changed.push(remote.clone());
                    remote
                }
                _ => {
                    stats.kept_local += 1;
                    local
                }
            },
        };
        records.push(chosen);
    }

    for key in remote_order {
        if let Some(remote) = remote_by_id.remove(&key) {
            stats.added_remote += 1;
            changed.push(remote.clone());
            records.push(remote);
        }
    }

    Reconciled {
        records,
        changed,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use habitsync_core::{HabitStatus, LogStatus};
    use proptest::prelude::*;

    fn habit(id: &str, name: &str, modified: u32) -> Habit {
        Habit {
            habit_id: id.into(),
            name: name.into(),
            category: None,
            status: HabitStatus::Active,
            created_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            modified_date: NaiveDate::from_ymd_opt(2025, 1, modified).unwrap(),
        }
    }

    fn log(id: &str, status: LogStatus, hour: Option<u32>) -> LogEntry {
        LogEntry {
            log_id: id.into(),
            habit_id: "h1".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            status,
            notes: None,
            timestamp: hour.map(|h| Utc.with_ymd_and_hms(2025, 1, 10, h, 0, 0).unwrap()),
        }
    }

    #[test]
    fn local_newer_is_kept() {
        let merged = last_write_wins(
            vec![habit("h1", "Walk", 10)],
            vec![habit("h1", "Run", 5)],
        );
        assert_eq!(merged.records, vec![habit("h1", "Walk", 10)]);
        assert!(merged.changed.is_empty());
        assert_eq!(merged.stats.kept_local, 1);
    }

    #[test]
    fn remote_newer_is_adopted_in_full() {
        let merged = last_write_wins(
            vec![habit("h1", "Walk", 5)],
            vec![habit("h1", "Run", 10)],
        );
        assert_eq!(merged.records, vec![habit("h1", "Run", 10)]);
        assert_eq!(merged.changed, vec![habit("h1", "Run", 10)]);
        assert_eq!(merged.stats.adopted_remote, 1);
    }

    #[test]
    fn ties_prefer_local() {
        let merged = last_write_wins(
            vec![habit("h1", "Local", 7)],
            vec![habit("h1", "Remote", 7)],
        );
        assert_eq!(merged.records[0].name, "Local");
    }

    #[test]
    fn missing_stamp_keeps_local() {
        let merged = last_write_wins(
            vec![log("l1", LogStatus::Done, None)],
            vec![log("l1", LogStatus::NotDone, Some(23))],
        );
        assert_eq!(merged.records[0].status, LogStatus::Done);

        let merged = last_write_wins(
            vec![log("l1", LogStatus::Done, Some(1))],
            vec![log("l1", LogStatus::NotDone, None)],
        );
        assert_eq!(merged.records[0].status, LogStatus::Done);
    }

    #[test]
    fn union_of_both_sides() {
        let merged = last_write_wins(
            vec![log("local", LogStatus::Done, Some(1))],
            vec![log("remote", LogStatus::NotDone, Some(2))],
        );
        let ids: Vec<_> = merged.records.iter().map(|l| l.log_id.as_str()).collect();
        assert_eq!(ids, vec!["local", "remote"]);
        assert_eq!(merged.changed.len(), 1);
        assert_eq!(merged.changed[0].log_id, "remote");
        assert_eq!(merged.stats.local_only, 1);
        assert_eq!(merged.stats.added_remote, 1);
    }

    fn arb_side() -> impl Strategy<Value = Vec<Habit>> {
        prop::collection::btree_map(0u8..8, (1u32..28, "[a-z]{1,4}"), 0..8).prop_map(|m| {
            m.into_iter()
                .map(|(id, (day, name))| habit(&format!("h{id}"), &name, day))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merge_is_deterministic_and_keyed(local in arb_side(), remote in arb_side()) {
            let first = last_write_wins(local.clone(), remote.clone());
            let second = last_write_wins(local.clone(), remote.clone());
            prop_assert_eq!(&first.records, &second.records);

            let mut ids: Vec<_> = first.records.iter().map(|h| h.habit_id.clone()).collect();
            let total = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), total);

            for merged in &first.records {
                let l = local.iter().find(|h| h.habit_id == merged.habit_id);
                let r = remote.iter().find(|h| h.habit_id == merged.habit_id);
                match (l, r) {
                    (Some(l), Some(r)) => {
                        let expected = if r.modified_date > l.modified_date { r } else { l };
                        prop_assert_eq!(merged, expected);
                    }
                    (Some(l), None) => prop_assert_eq!(merged, l),
                    (None, Some(r)) => prop_assert_eq!(merged, r),
                    (None, None) => prop_assert!(false, "record from nowhere"),
                }
            }
        }
    }
}
