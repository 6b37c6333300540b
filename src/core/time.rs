use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time '{0}', expected HH:MM between 00:00 and 23:59")]
pub struct InvalidTime(pub String);

/// Wall-clock time of day a schedule fires at, in the configured timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleTime {
    hour: u32,
    minute: u32,
}

pub const DEFAULT_RUN_TIME: ScheduleTime = ScheduleTime { hour: 7, minute: 0 };
pub const DEFAULT_REPORT_TIME: ScheduleTime = ScheduleTime { hour: 10, minute: 0 };

impl ScheduleTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Six-field cron expression firing once a day at this time.
    pub fn cron_expression(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }
}

impl FromStr for ScheduleTime {
    type Err = InvalidTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || InvalidTime(raw.to_string());
        let (h, m) = raw.split_once(':').ok_or_else(invalid)?;
        let well_formed = |part: &str| {
            (1..=2).contains(&part.len()) && part.chars().all(|c| c.is_ascii_digit())
        };
        if !well_formed(h) || m.len() != 2 || !well_formed(m) {
            return Err(invalid());
        }
        let hour = h.parse().map_err(|_| invalid())?;
        let minute = m.parse().map_err(|_| invalid())?;
        ScheduleTime::new(hour, minute).ok_or_else(invalid)
    }
}

impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Half-open `[start, end)` interval used for report queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    // Wall times skipped by a DST jump resolve to the UTC reading of the same clock.
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    localize(tz, date.and_time(NaiveTime::MIN)).with_timezone(&Utc)
}

/// Next instant strictly after `now` at which `time` occurs.
pub fn next_occurrence(time: ScheduleTime, now: DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let at = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(NaiveTime::MIN);
    let today = localize(tz, now.date_naive().and_time(at));
    if today > now {
        return today;
    }
    let tomorrow = now.date_naive() + Days::new(1);
    localize(tz, tomorrow.and_time(at))
}

/// Monday 00:00 to Monday 00:00 of the week before the one containing `now`.
pub fn previous_week(now: DateTime<Tz>) -> Period {
    let tz = now.timezone();
    let today = now.date_naive();
    let this_monday = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
    let last_monday = this_monday - Days::new(7);
    Period {
        start: local_midnight(tz, last_monday),
        end: local_midnight(tz, this_monday),
    }
}

/// The full calendar month before the one containing `now`.
pub fn previous_month(now: DateTime<Tz>) -> Period {
    let tz = now.timezone();
    let today = now.date_naive();
    let first_of_this = today - Days::new(u64::from(today.day0()));
    let last_of_prev = first_of_this - Days::new(1);
    let first_of_prev = last_of_prev - Days::new(u64::from(last_of_prev.day0()));
    Period {
        start: local_midnight(tz, first_of_prev),
        end: local_midnight(tz, first_of_this),
    }
}

pub fn humanize_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (days, hours, minutes) = (total / 86_400, (total % 86_400) / 3_600, (total % 3_600) / 60);
    match (days, hours, minutes) {
        (0, 0, 0) => format!("{}s", total),
        (0, 0, m) => format!("{}m", m),
        (0, h, m) => format!("{}h {}m", h, m),
        (d, h, _) => format!("{}d {}h", d, h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Seoul;

    #[test]
    fn parses_valid_times() {
        let t: ScheduleTime = "7:05".parse().unwrap();
        assert_eq!(t.to_string(), "07:05");
        assert_eq!(t.cron_expression(), "0 5 7 * * *");
        assert_eq!("23:59".parse::<ScheduleTime>().unwrap().hour(), 23);
    }

    #[test]
    fn rejects_malformed_times() {
        for raw in ["24:00", "12:60", "noon", "7", "07:5", "-1:00", "07:00:00", ""] {
            assert!(raw.parse::<ScheduleTime>().is_err(), "{raw} should fail");
        }
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow_once_passed() {
        let time: ScheduleTime = "07:00".parse().unwrap();
        let before = Seoul.with_ymd_and_hms(2026, 3, 10, 6, 30, 0).unwrap();
        assert_eq!(
            next_occurrence(time, before),
            Seoul.with_ymd_and_hms(2026, 3, 10, 7, 0, 0).unwrap()
        );
        let exactly = Seoul.with_ymd_and_hms(2026, 3, 10, 7, 0, 0).unwrap();
        assert_eq!(
            next_occurrence(time, exactly),
            Seoul.with_ymd_and_hms(2026, 3, 11, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn previous_week_spans_monday_to_monday() {
        // Wednesday
        let now = Seoul.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
        let period = previous_week(now);
        assert_eq!(
            period.start,
            Seoul.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap().with_timezone(&Utc)
        );
        assert_eq!(
            period.end,
            Seoul.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap().with_timezone(&Utc)
        );
    }

    #[test]
    fn previous_month_wraps_the_year() {
        let now = Seoul.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let period = previous_month(now);
        assert_eq!(
            period.start,
            Seoul.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap().with_timezone(&Utc)
        );
        assert_eq!(
            period.end,
            Seoul.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap().with_timezone(&Utc)
        );
    }

    #[test]
    fn humanizes_durations() {
        assert_eq!(humanize_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(humanize_duration(chrono::Duration::minutes(90)), "1h 30m");
        assert_eq!(humanize_duration(chrono::Duration::hours(50)), "2d 2h");
    }
}
