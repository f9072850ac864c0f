use chrono::{DateTime, Utc};

use crate::models::calendar_block::CalendarBlock;
use crate::models::profile::Profile;
use crate::services::time_algebra::{self, Interval};
use crate::services::work_window_resolver;

pub const MIN_SLOT_MINUTES: i64 = 15;

/// Free intervals of at least `MIN_SLOT_MINUTES`, in chronological order,
/// that lie inside some working window and do not intersect any calendar
/// block (`aawo` or `external` alike — both count as busy).
pub fn find(
    profile: &Profile,
    blocks: &[CalendarBlock],
    horizon_start: DateTime<Utc>,
    horizon_end: DateTime<Utc>,
) -> Vec<Interval> {
    let work_windows = work_window_resolver::resolve(profile, horizon_start, horizon_end);
    let busy: Vec<Interval> = blocks
        .iter()
        .filter_map(|block| Interval::new(block.start, block.end).ok())
        .collect();
    time_algebra::subtract(&work_windows, &busy)
        .into_iter()
        .filter(|iv| iv.duration_minutes() >= MIN_SLOT_MINUTES)
        .collect()
}
