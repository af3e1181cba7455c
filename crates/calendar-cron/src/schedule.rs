//! Meeting date selection.
//!
//! Remediation meetings are always booked on a Tuesday so they land on a
//! predictable weekly cadence.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

pub const PREFERRED_WEEKDAY: Weekday = Weekday::Tue;

/// Earliest Tuesday on or after the given calendar day.
///
/// Returns `None` if `(year, month, day)` is not a valid date.
pub fn next_preferred_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    preferred_date_on_or_after(NaiveDate::from_ymd_opt(year, month, day)?)
}

pub fn preferred_date_on_or_after(date: NaiveDate) -> Option<NaiveDate> {
    let from = date.weekday().num_days_from_monday();
    let target = PREFERRED_WEEKDAY.num_days_from_monday();
    let offset = (target + 7 - from) % 7;
    date.checked_add_days(Days::new(u64::from(offset)))
}

/// Time of day and length of a booked meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeetingSlot {
    /// Local hour (0-23) the meeting starts at
    pub start_hour: u32,
    pub duration: chrono::Duration,
    pub timezone: Tz,
}

impl Default for MeetingSlot {
    fn default() -> Self {
        Self {
            start_hour: 9,
            duration: chrono::Duration::minutes(30),
            timezone: Tz::UTC,
        }
    }
}

impl MeetingSlot {
    /// Start and end of the next meeting strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut day = now.with_timezone(&self.timezone).date_naive();

        // Today's Tuesday may already be past; next week's never is.
        for _ in 0..2 {
            let date = preferred_date_on_or_after(day)?;
            let start = self.local_start(date)?;
            if start > now {
                return Some((start, start + self.duration));
            }
            day = date.succ_opt()?;
        }

        None
    }

    pub fn timezone_name(&self) -> &'static str {
        self.timezone.name()
    }

    fn local_start(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(self.start_hour, 0, 0)?;
        // A start inside a DST gap moves to the first valid local time.
        let local = self
            .timezone
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(naive + chrono::Duration::hours(1)))
                    .earliest()
            })?;
        Some(local.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_preferred_date_table() {
        let cases = [
            ("March 2024 (before 1st Tuesday)", 2024, 3, 1, 5, date(2024, 3, 5)),
            ("March 2024 (past 1st Tuesday)", 2024, 3, 6, 12, date(2024, 3, 12)),
            ("April 2024 (before 3rd Tuesday)", 2024, 4, 10, 16, date(2024, 4, 16)),
            ("April 2024 (after 3rd Tuesday)", 2024, 4, 17, 23, date(2024, 4, 23)),
            ("May 2024 (before last Tuesday)", 2024, 5, 22, 28, date(2024, 5, 28)),
            ("May 2024 (after last Tuesday)", 2024, 5, 29, 31, date(2024, 6, 4)),
            ("Dec 2025 (before last Tuesday)", 2025, 12, 24, 30, date(2025, 12, 30)),
            ("Dec 2025 (after last Tuesday)", 2025, 12, 31, 31, date(2026, 1, 6)),
        ];

        for (name, year, month, start, end, expected) in cases {
            for day in start..=end {
                let actual = next_preferred_date(year, month, day).unwrap();
                assert_eq!(actual, expected, "{} (day {})", name, day);
            }
        }
    }

    #[test]
    fn test_preferred_date_is_tuesday_and_not_before_input() {
        let mut day = date(2023, 11, 1);
        let last = date(2026, 3, 1);
        while day <= last {
            let preferred = preferred_date_on_or_after(day).unwrap();
            assert_eq!(preferred.weekday(), Weekday::Tue);
            assert!(preferred >= day);
            assert!((preferred - day).num_days() < 7);
            assert_ne!(preferred.weekday(), Weekday::Sat);
            assert_ne!(preferred.weekday(), Weekday::Sun);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_invalid_date_rejected() {
        assert_eq!(next_preferred_date(2024, 2, 30), None);
        assert_eq!(next_preferred_date(2024, 13, 1), None);
    }

    #[test]
    fn test_leap_day_rollover() {
        // Thursday, Feb 29 2024
        assert_eq!(next_preferred_date(2024, 2, 29), Some(date(2024, 3, 5)));
    }

    #[test]
    fn test_slot_before_start_on_tuesday_books_same_day() {
        let slot = MeetingSlot::default();
        let (start, end) = slot.next_after(utc(2024, 3, 5, 8, 0)).unwrap();
        assert_eq!(start, utc(2024, 3, 5, 9, 0));
        assert_eq!(end, utc(2024, 3, 5, 9, 30));
    }

    #[test]
    fn test_slot_at_or_after_start_books_next_week() {
        let slot = MeetingSlot::default();
        let (start, _) = slot.next_after(utc(2024, 3, 5, 9, 0)).unwrap();
        assert_eq!(start, utc(2024, 3, 12, 9, 0));

        let (start, _) = slot.next_after(utc(2024, 3, 5, 17, 45)).unwrap();
        assert_eq!(start, utc(2024, 3, 12, 9, 0));
    }

    #[test]
    fn test_slot_from_monday() {
        let slot = MeetingSlot::default();
        let (start, _) = slot.next_after(utc(2024, 3, 4, 10, 0)).unwrap();
        assert_eq!(start, utc(2024, 3, 5, 9, 0));
    }

    #[test]
    fn test_slot_year_rollover() {
        let slot = MeetingSlot::default();
        let (start, _) = slot.next_after(utc(2025, 12, 31, 12, 0)).unwrap();
        assert_eq!(start, utc(2026, 1, 6, 9, 0));
    }

    #[test]
    fn test_slot_in_local_timezone() {
        let slot = MeetingSlot {
            timezone: chrono_tz::America::New_York,
            ..Default::default()
        };
        // Daylight saving time started on Sunday, March 10 2024 (UTC-4).
        let (start, end) = slot.next_after(utc(2024, 3, 11, 12, 0)).unwrap();
        assert_eq!(start, utc(2024, 3, 12, 13, 0));
        assert_eq!(end, utc(2024, 3, 12, 13, 30));
        assert_eq!(slot.timezone_name(), "America/New_York");
    }

    #[test]
    fn test_slot_uses_local_date_not_utc_date() {
        let slot = MeetingSlot {
            timezone: chrono_tz::Asia::Tokyo,
            ..Default::default()
        };
        // Monday 20:00 UTC is already Tuesday 05:00 in Tokyo.
        let (start, _) = slot.next_after(utc(2024, 3, 4, 20, 0)).unwrap();
        assert_eq!(start, utc(2024, 3, 5, 0, 0));
    }
}
