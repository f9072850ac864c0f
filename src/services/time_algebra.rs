use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::json;

use crate::error::{AppError, AppResult};

/// A half-open time interval `[start, end)`. The touching endpoint rule is
/// load-bearing throughout the scheduling stack: two intervals that only
/// touch at a boundary (`a.end == b.start`) do not overlap and do not merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<Self> {
        if end <= start {
            return Err(AppError::validation_with_details(
                "interval end must be after start",
                json!({"start": start.to_rfc3339(), "end": end.to_rfc3339()}),
            ));
        }
        Ok(Interval { start, end })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, point: DateTime<Utc>) -> bool {
        self.start <= point && point < self.end
    }
}

/// Merges overlapping or touching intervals into their minimal covering set,
/// sorted by start time.
pub fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by_key(|iv| iv.start);
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Subtracts `busy` from `free`, producing the remaining free sub-intervals.
/// `busy` need not be pre-merged or sorted. Touching a boundary does not cut
/// anything away: a busy block `[10:00,11:00)` does not shrink a free block
/// ending exactly at `10:00` or starting exactly at `11:00`.
pub fn subtract(free: &[Interval], busy: &[Interval]) -> Vec<Interval> {
    let busy = merge(busy.to_vec());
    let mut result = Vec::new();
    for window in free {
        let mut cursor = window.start;
        for block in &busy {
            if block.end <= cursor || block.start >= window.end {
                continue;
            }
            if block.start > cursor {
                if let Ok(gap) = Interval::new(cursor, block.start.min(window.end)) {
                    result.push(gap);
                }
            }
            if block.end > cursor {
                cursor = block.end;
            }
            if cursor >= window.end {
                break;
            }
        }
        if cursor < window.end {
            if let Ok(gap) = Interval::new(cursor, window.end) {
                result.push(gap);
            }
        }
    }
    result
}

/// True when two spans (given as raw bounds, not `Interval`) overlap under
/// half-open semantics. Kept separate from `Interval::overlaps` for call
/// sites that only have raw bounds and don't want a validating construction.
pub fn raw_overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn add_minutes(dt: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    dt + Duration::minutes(minutes)
}

/// Parses a profile's configured timezone name, falling back to UTC for an
/// unrecognized string rather than failing interval arithmetic outright.
pub fn parse_tz(name: &str) -> Tz {
    name.parse().unwrap_or(chrono_tz::UTC)
}

/// Converts a UTC instant into its wall-clock representation in `tz`. Every
/// instant in this codebase is already zone-aware (`DateTime<Utc>`), so this
/// is always the "convert" branch, never the "attach" branch.
pub fn coerce_tz(instant: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    instant.with_timezone(&tz)
}

/// Combines a local calendar date and wall-clock time in `tz` into the UTC
/// instant it denotes. Ambiguous (DST fall-back) local times resolve to the
/// earlier of the two possible instants; nonexistent (DST spring-forward)
/// local times return `None`.
pub fn local_datetime_to_utc(
    date: chrono::NaiveDate,
    time: chrono::NaiveTime,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn touching_intervals_do_not_merge_into_overlap_but_do_coalesce() {
        let a = Interval::new(at(9, 0), at(10, 0)).unwrap();
        let b = Interval::new(at(10, 0), at(11, 0)).unwrap();
        assert!(!a.overlaps(&b));
        let merged = merge(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start, at(9, 0));
        assert_eq!(merged[0].end, at(11, 0));
    }

    #[test]
    fn subtract_leaves_touching_boundaries_intact() {
        let free = vec![Interval::new(at(9, 0), at(12, 0)).unwrap()];
        let busy = vec![Interval::new(at(10, 0), at(11, 0)).unwrap()];
        let free_after = subtract(&free, &busy);
        assert_eq!(free_after.len(), 2);
        assert_eq!(free_after[0].end, at(10, 0));
        assert_eq!(free_after[1].start, at(11, 0));
    }

    #[test]
    fn subtract_handles_fully_covering_busy_block() {
        let free = vec![Interval::new(at(9, 0), at(10, 0)).unwrap()];
        let busy = vec![Interval::new(at(8, 0), at(11, 0)).unwrap()];
        assert!(subtract(&free, &busy).is_empty());
    }
}
