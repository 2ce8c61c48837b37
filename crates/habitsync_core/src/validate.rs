//! Field rules enforced at the write boundary.

use crate::error::ValidationError;
use chrono::NaiveDate;

/// Longest habit name, in characters.
pub const MAX_NAME_LEN: usize = 100;
/// Longest category, in characters.
pub const MAX_CATEGORY_LEN: usize = 50;
/// Longest day notes, in characters.
pub const MAX_NOTES_LEN: usize = 5000;
/// How many days back a log may still be written.
pub const EDIT_WINDOW_DAYS: i64 = 5;

/// Trims and checks a habit name.
pub fn habit_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 {
        return Err(ValidationError::EmptyName);
    }
    if len > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong {
            len,
            max: MAX_NAME_LEN,
        });
    }
    Ok(name.to_owned())
}

/// Trims a category; blank becomes `None`.
pub fn category(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(category) = raw.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let len = category.chars().count();
    if len > MAX_CATEGORY_LEN {
        return Err(ValidationError::CategoryTooLong {
            len,
            max: MAX_CATEGORY_LEN,
        });
    }
    Ok(Some(category.to_owned()))
}

/// Checks day notes; blank becomes `None`.
pub fn notes(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(notes) = raw.filter(|n| !n.trim().is_empty()) else {
        return Ok(None);
    };
    let len = notes.chars().count();
    if len > MAX_NOTES_LEN {
        return Err(ValidationError::NotesTooLong {
            len,
            max: MAX_NOTES_LEN,
        });
    }
    Ok(Some(notes.to_owned()))
}

/// Checks that `date` is today or within the editable window before it.
pub fn log_date(date: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    if date > today {
        return Err(ValidationError::FutureDate { date });
    }
    if (today - date).num_days() > EDIT_WINDOW_DAYS {
        return Err(ValidationError::DateOutsideWindow {
            date,
            window: EDIT_WINDOW_DAYS,
        });
    }
    Ok(())
}

/// Case-insensitive name comparison used for uniqueness.
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(habit_name("  Run  ").unwrap(), "Run");
        assert_eq!(habit_name("   "), Err(ValidationError::EmptyName));
        assert!(habit_name(&"x".repeat(100)).is_ok());
        assert_eq!(
            habit_name(&"x".repeat(101)),
            Err(ValidationError::NameTooLong { len: 101, max: 100 })
        );
        // limits count characters, not bytes
        assert!(habit_name(&"é".repeat(100)).is_ok());
    }

    #[test]
    fn blank_category_is_absent() {
        assert_eq!(category(None).unwrap(), None);
        assert_eq!(category(Some("   ")).unwrap(), None);
        assert_eq!(category(Some(" Health ")).unwrap(), Some("Health".into()));
        assert!(category(Some(&"c".repeat(51))).is_err());
    }

    #[test]
    fn notes_limit() {
        assert!(notes(Some(&"n".repeat(5000))).is_ok());
        assert!(matches!(
            notes(Some(&"n".repeat(5001))),
            Err(ValidationError::NotesTooLong { len: 5001, .. })
        ));
    }

    #[test]
    fn log_date_window() {
        let today = date(10);
        assert!(log_date(today, today).is_ok());
        assert!(log_date(date(5), today).is_ok());
        assert!(matches!(
            log_date(date(4), today),
            Err(ValidationError::DateOutsideWindow { .. })
        ));
        assert!(matches!(
            log_date(date(11), today),
            Err(ValidationError::FutureDate { .. })
        ));
    }

    #[test]
    fn name_comparison_ignores_case() {
        assert!(same_name("Read Book", " read book"));
        assert!(!same_name("Read", "Run"));
    }
}
