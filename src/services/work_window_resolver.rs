use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::models::profile::{Profile, WorkingDay};
use crate::services::time_algebra::{self, Interval};

fn day_key(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn parse_hm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

fn day_window(day: &WorkingDay, date: chrono::NaiveDate, tz: Tz) -> Option<Interval> {
    let start_time = parse_hm(&day.start)?;
    let end_time = parse_hm(&day.end)?;
    let start = time_algebra::local_datetime_to_utc(date, start_time, tz)?;
    let end = time_algebra::local_datetime_to_utc(date, end_time, tz)?;
    Interval::new(start, end).ok()
}

/// For every date in `[horizon_start, horizon_end)`, emits that weekday's
/// working window clipped to the horizon, with the lunch window (if any)
/// subtracted. Days with no configured entry contribute nothing. Deep-work
/// windows are a Scheduler scoring hint, never subtracted here. Wall-clock
/// bounds like `"09:00"` are interpreted in the profile's timezone, not UTC.
pub fn resolve(
    profile: &Profile,
    horizon_start: DateTime<Utc>,
    horizon_end: DateTime<Utc>,
) -> Vec<Interval> {
    if horizon_end <= horizon_start {
        return Vec::new();
    }
    let tz = time_algebra::parse_tz(&profile.timezone);
    let mut windows = Vec::new();
    let mut date = time_algebra::coerce_tz(horizon_start, tz).date_naive();
    let last_date = time_algebra::coerce_tz(horizon_end, tz).date_naive();

    while date <= last_date {
        let key = day_key(date.weekday());
        if let Some(day) = profile.working_hours.days.iter().find(|d| d.day == key) {
            if let Some(window) = day_window(day, date, tz) {
                let clipped_start = window.start.max(horizon_start);
                let clipped_end = window.end.min(horizon_end);
                if let Ok(clipped) = Interval::new(clipped_start, clipped_end) {
                    let lunch_busy = profile
                        .working_hours
                        .lunch
                        .as_ref()
                        .and_then(|lunch| {
                            let lunch_start = parse_hm(&lunch.start)?;
                            let lunch_end = parse_hm(&lunch.end)?;
                            let start = time_algebra::local_datetime_to_utc(date, lunch_start, tz)?;
                            let end = time_algebra::local_datetime_to_utc(date, lunch_end, tz)?;
                            Interval::new(start, end).ok()
                        })
                        .into_iter()
                        .collect::<Vec<_>>();
                    windows.extend(time_algebra::subtract(&[clipped], &lunch_busy));
                }
            }
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::{Preferences, WorkingHours};
    use chrono::TimeZone as _;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, hour, minute, 0).unwrap()
    }

    fn profile() -> Profile {
        Profile {
            id: "default".into(),
            timezone: "UTC".into(),
            autonomy_level: "L2".into(),
            working_hours: WorkingHours::default(),
            preferences: Preferences::default(),
            version: 1,
            created_at: at(1, 0, 0),
            updated_at: at(1, 0, 0),
        }
    }

    #[test]
    fn splits_working_day_around_lunch() {
        // 2026-08-03 is a Monday.
        let windows = resolve(&profile(), at(3, 0, 0), at(4, 0, 0));
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].end, at(3, 12, 0));
        assert_eq!(windows[1].start, at(3, 13, 0));
    }

    #[test]
    fn weekend_contributes_nothing() {
        // 2026-08-01 is a Saturday, 2026-08-02 a Sunday.
        let windows = resolve(&profile(), at(1, 0, 0), at(2, 23, 0));
        assert!(windows.is_empty());
    }
}
