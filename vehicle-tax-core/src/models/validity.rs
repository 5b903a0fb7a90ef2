use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Inclusive validity interval of a rule version. `valid_to = None` means the
/// version is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validity {
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl Validity {
    pub fn open(valid_from: NaiveDate) -> Self {
        Self {
            valid_from,
            valid_to: None,
        }
    }

    pub fn bounded(valid_from: NaiveDate, valid_to: NaiveDate) -> Self {
        Self {
            valid_from,
            valid_to: Some(valid_to),
        }
    }

    pub fn is_open(&self) -> bool {
        self.valid_to.is_none()
    }

    /// `valid_from <= date` and (`valid_to` absent or `date <= valid_to`).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && self.valid_to.is_none_or(|to| date <= to)
    }

    /// True when at least one day lies in both intervals.
    pub fn overlaps(&self, other: &Validity) -> bool {
        let self_before_other_ends = other.valid_to.is_none_or(|to| self.valid_from <= to);
        let other_before_self_ends = self.valid_to.is_none_or(|to| other.valid_from <= to);
        self_before_other_ends && other_before_self_ends
    }

    /// An interval whose end precedes its start contains no day at all.
    pub fn is_empty(&self) -> bool {
        self.valid_to.is_some_and(|to| to < self.valid_from)
    }
}

/// Anything that carries a validity interval.
pub trait Versioned {
    fn validity(&self) -> Validity;

    fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.validity().contains(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn contains_is_inclusive_on_both_ends() {
        let validity = Validity::bounded(date(2025, 1, 1), date(2025, 6, 30));
        assert!(validity.contains(date(2025, 1, 1)));
        assert!(validity.contains(date(2025, 6, 30)));
        assert!(!validity.contains(date(2024, 12, 31)));
        assert!(!validity.contains(date(2025, 7, 1)));
    }

    #[test]
    fn open_interval_contains_every_later_date() {
        let validity = Validity::open(date(2025, 7, 1));
        assert!(validity.is_open());
        assert!(validity.contains(date(2099, 12, 31)));
        assert!(!validity.contains(date(2025, 6, 30)));
    }

    #[test]
    fn adjacent_intervals_do_not_overlap() {
        let old = Validity::bounded(date(2024, 7, 1), date(2025, 6, 30));
        let new = Validity::open(date(2025, 7, 1));
        assert!(!old.overlaps(&new));
        assert!(!new.overlaps(&old));
    }

    #[test]
    fn shared_day_counts_as_overlap() {
        let old = Validity::bounded(date(2024, 7, 1), date(2025, 7, 1));
        let new = Validity::open(date(2025, 7, 1));
        assert!(old.overlaps(&new));
        assert!(Validity::open(date(2020, 1, 1)).overlaps(&new));
    }

    #[test]
    fn closing_before_start_yields_empty_interval() {
        assert!(Validity::bounded(date(2025, 7, 1), date(2025, 6, 30)).is_empty());
        assert!(!Validity::bounded(date(2025, 7, 1), date(2025, 7, 1)).is_empty());
    }
}
