//! Recurrence rules
//!
//! All wall-clock schedules are evaluated in UTC.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

use patchscout_common::{ScoutError, ScoutResult};

/// How far ahead a monthly rule looks for a month containing its day.
const MONTH_SEARCH_LIMIT: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
    /// Months without `day` (e.g. the 31st in April) are skipped.
    Monthly { day: u32, hour: u32, minute: u32 },
    Interval { every: Duration },
}

impl Schedule {
    /// Interval from whole hours and minutes, as schedules are usually written.
    ///
    /// Values too large to add up saturate to [`Duration::MAX`], which
    /// [`Schedule::validate`] rejects.
    pub fn every(hours: u64, minutes: u64) -> Self {
        let secs = hours
            .checked_mul(3600)
            .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)));
        Schedule::Interval {
            every: secs.map_or(Duration::MAX, Duration::from_secs),
        }
    }

    /// Prefix of the job ids this rule produces.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Schedule::Daily { .. } => "daily",
            Schedule::Weekly { .. } => "weekly",
            Schedule::Monthly { .. } => "monthly",
            Schedule::Interval { .. } => "interval",
        }
    }

    pub fn validate(&self) -> ScoutResult<()> {
        let check_time = |hour: u32, minute: u32| {
            if hour > 23 || minute > 59 {
                Err(ScoutError::InvalidInput(format!(
                    "invalid time {hour:02}:{minute:02}"
                )))
            } else {
                Ok(())
            }
        };

        match *self {
            Schedule::Daily { hour, minute } | Schedule::Weekly { hour, minute, .. } => {
                check_time(hour, minute)
            }
            Schedule::Monthly { day, hour, minute } => {
                if !(1..=31).contains(&day) {
                    return Err(ScoutError::InvalidInput(format!(
                        "day of month must be 1-31, got {day}"
                    )));
                }
                check_time(hour, minute)
            }
            Schedule::Interval { every } => {
                if every.is_zero() {
                    Err(ScoutError::InvalidInput(
                        "interval must specify hours or minutes".into(),
                    ))
                } else if chrono::Duration::from_std(every).is_err() {
                    Err(ScoutError::InvalidInput("interval is too long".into()))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Schedule::Daily { hour, minute } => {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                (0..=1)
                    .filter_map(|d| after.date_naive().checked_add_days(Days::new(d)))
                    .map(|date| at(date, time))
                    .find(|candidate| *candidate > after)
            }
            Schedule::Weekly { weekday, hour, minute } => {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                (0..=7)
                    .filter_map(|d| after.date_naive().checked_add_days(Days::new(d)))
                    .filter(|date| date.weekday() == weekday)
                    .map(|date| at(date, time))
                    .find(|candidate| *candidate > after)
            }
            Schedule::Monthly { day, hour, minute } => {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                let first = after.date_naive().with_day(1)?;
                (0..MONTH_SEARCH_LIMIT)
                    .filter_map(|m| first.checked_add_months(Months::new(m)))
                    .filter_map(|month| NaiveDate::from_ymd_opt(month.year(), month.month(), day))
                    .map(|date| at(date, time))
                    .find(|candidate| *candidate > after)
            }
            Schedule::Interval { every } => {
                let every = chrono::Duration::from_std(every).ok()?;
                after.checked_add_signed(every)
            }
        }
    }
}

fn at(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02} UTC"),
            Schedule::Weekly { weekday, hour, minute } => {
                write!(f, "weekly on {weekday} at {hour:02}:{minute:02} UTC")
            }
            Schedule::Monthly { day, hour, minute } => {
                write!(f, "monthly on day {day} at {hour:02}:{minute:02} UTC")
            }
            Schedule::Interval { every } => {
                let secs = every.as_secs();
                write!(f, "every {}h {}m", secs / 3600, (secs % 3600) / 60)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn daily_rolls_to_next_day() {
        let daily = Schedule::Daily { hour: 2, minute: 0 };
        assert_eq!(
            daily.next_after(utc(2024, 5, 10, 1, 0)),
            Some(utc(2024, 5, 10, 2, 0))
        );
        assert_eq!(
            daily.next_after(utc(2024, 5, 10, 2, 0)),
            Some(utc(2024, 5, 11, 2, 0))
        );
    }

    #[test]
    fn weekly_finds_weekday() {
        let sunday = Schedule::Weekly {
            weekday: Weekday::Sun,
            hour: 1,
            minute: 0,
        };
        // 2024-05-10 is a Friday
        assert_eq!(
            sunday.next_after(utc(2024, 5, 10, 12, 0)),
            Some(utc(2024, 5, 12, 1, 0))
        );
        // Sunday after the fire time goes to next week
        assert_eq!(
            sunday.next_after(utc(2024, 5, 12, 1, 30)),
            Some(utc(2024, 5, 19, 1, 0))
        );
    }

    #[test]
    fn monthly_skips_short_months() {
        let last = Schedule::Monthly {
            day: 31,
            hour: 2,
            minute: 0,
        };
        assert_eq!(
            last.next_after(utc(2024, 4, 1, 0, 0)),
            Some(utc(2024, 5, 31, 2, 0))
        );
        assert_eq!(
            last.next_after(utc(2024, 5, 31, 3, 0)),
            Some(utc(2024, 7, 31, 2, 0))
        );
    }

    #[test]
    fn interval_adds_duration() {
        let every = Schedule::every(1, 30);
        assert_eq!(
            every.next_after(utc(2024, 1, 1, 0, 0)),
            Some(utc(2024, 1, 1, 1, 30))
        );
        assert_eq!(every.to_string(), "every 1h 30m");
    }

    #[test]
    fn validation() {
        assert!(Schedule::every(0, 0).validate().is_err());
        assert!(Schedule::Daily { hour: 24, minute: 0 }.validate().is_err());
        assert!(Schedule::Monthly { day: 0, hour: 1, minute: 0 }.validate().is_err());
        assert!(Schedule::Weekly {
            weekday: Weekday::Mon,
            hour: 23,
            minute: 59
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let huge = Schedule::every(u64::MAX, 0);
        assert_eq!(huge, Schedule::Interval { every: Duration::MAX });
        assert!(huge.validate().is_err());
        assert!(Schedule::every(0, u64::MAX).validate().is_err());
        assert!(Schedule::every(u64::MAX / 3600, 0).validate().is_err());
        assert!(Schedule::every(24 * 365, 0).validate().is_ok());
    }
}
