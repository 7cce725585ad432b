//! Release date cutoff
//!
//! Records dated on or before `today - days` are dropped. In debug mode
//! nothing is dropped: out-of-range records are annotated and surfaced for
//! inspection instead.

use chrono::{Days, NaiveDate, Utc};

use crate::records::Record;

/// Any `days` above this disables filtering (about 75 years)
pub const NO_FILTER_DAYS: u32 = 27375;

pub const FILTERED_REASON: &str = "Scene filtered due to date restraint";

#[derive(Debug)]
pub enum Verdict {
    Accept(Record),
    /// Debug mode: the record is shown but never submitted
    Inspect(Record),
    Reject(Record),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFilter {
    days: u32,
    today: NaiveDate,
}

impl DateFilter {
    pub fn new(days: u32) -> Self {
        Self::with_today(days, Utc::now().date_naive())
    }

    pub fn with_today(days: u32, today: NaiveDate) -> Self {
        Self { days, today }
    }

    pub fn is_disabled(&self) -> bool {
        self.days > NO_FILTER_DAYS
    }

    /// `YYYY-MM-DD` that accepted dates must be strictly after
    pub fn cutoff(&self) -> Option<String> {
        if self.is_disabled() {
            return None;
        }
        let cutoff = self
            .today
            .checked_sub_days(Days::new(u64::from(self.days)))
            .unwrap_or(NaiveDate::MIN);
        Some(cutoff.format("%Y-%m-%d").to_string())
    }

    pub fn accepts(&self, date: &str) -> bool {
        match self.cutoff() {
            None => true,
            Some(cutoff) => date.get(..10).unwrap_or(date) > cutoff.as_str(),
        }
    }

    pub fn check(&self, mut record: Record, debug: bool) -> Verdict {
        let accepted = match record.date() {
            Some(date) => self.accepts(date),
            None => true,
        };

        if debug {
            if !accepted {
                record.set_filtered(FILTERED_REASON);
            }
            return Verdict::Inspect(record);
        }

        if accepted {
            Verdict::Accept(record)
        } else {
            log::debug!("{} dropped by date filter", record.url());
            Verdict::Reject(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Performer, Scene};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn scene(date: &str) -> Record {
        Record::Scene(Scene {
            date: date.to_string(),
            url: "https://example.com/scene/1".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_thirty_day_window() {
        let filter = DateFilter::with_today(30, today());
        assert_eq!(filter.cutoff(), Some("2024-05-16".to_string()));
        assert!(!filter.accepts("2024-05-01T00:00:00"));
        assert!(filter.accepts("2024-06-01T00:00:00"));
        assert!(!filter.accepts("2024-05-16T12:00:00"));
        assert!(filter.accepts("2024-05-17"));
    }

    #[test]
    fn test_disabled() {
        let filter = DateFilter::with_today(NO_FILTER_DAYS + 1, today());
        assert!(filter.is_disabled());
        assert!(filter.accepts("1970-01-01T00:00:00"));

        let filter = DateFilter::with_today(9999, today());
        assert!(!filter.is_disabled());
        assert!(!filter.accepts("1990-01-01T00:00:00"));
    }

    #[test]
    fn test_check_verdicts() {
        let filter = DateFilter::with_today(30, today());

        assert!(matches!(
            filter.check(scene("2024-06-01T00:00:00"), false),
            Verdict::Accept(_)
        ));
        assert!(matches!(
            filter.check(scene("2024-05-01T00:00:00"), false),
            Verdict::Reject(_)
        ));

        let Verdict::Inspect(record) = filter.check(scene("2024-05-01T00:00:00"), true) else {
            panic!("debug mode must surface the record");
        };
        assert_eq!(record.filtered(), Some(FILTERED_REASON));

        let Verdict::Inspect(record) = filter.check(scene("2024-06-01T00:00:00"), true) else {
            panic!("debug mode must surface the record");
        };
        assert_eq!(record.filtered(), None);
    }

    #[test]
    fn test_performers_pass() {
        let filter = DateFilter::with_today(1, today());
        let performer = Record::Performer(Performer::default());
        assert!(matches!(filter.check(performer, false), Verdict::Accept(_)));
    }
}
