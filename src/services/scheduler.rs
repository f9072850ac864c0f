use std::cmp::Ordering;

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::calendar_block::CalendarBlock;
use crate::models::profile::{DeepWorkWindow, Profile};
use crate::models::proposal::{CreateBlockPayload, ProposalScore, SchedulingChange, SchedulingProposal, Strategy};
use crate::models::task::Task;
use crate::services::free_slot_finder;
use crate::services::time_algebra::{self, Interval};

pub const MIN_SLOT_MINUTES: i64 = 15;
pub const MAX_SLOT_MINUTES: i64 = 60;
pub const MIN_MAX_PROPOSALS: i64 = 1;
pub const MAX_MAX_PROPOSALS: i64 = 5;
const REQUIRED_MINUTES_CAP: i64 = 120;
const FOCUS_BLOCK_THRESHOLD_MINUTES: i64 = 90;

pub struct Scheduler;

struct PlacedBlock {
    task_id: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    due: Option<DateTime<Utc>>,
}

impl Scheduler {
    /// Produces up to `max_proposals` draft proposals, one per strategy in
    /// the fixed order [stable, urgent, focus], truncated to the requested
    /// count. Does not mutate the calendar; `ProposalApplier` commits later.
    pub fn generate(
        profile: &Profile,
        horizon_start: DateTime<Utc>,
        horizon_end: DateTime<Utc>,
        candidates: Vec<Task>,
        existing_blocks: &[CalendarBlock],
        slot_minutes: i64,
        max_proposals: i64,
    ) -> AppResult<Vec<SchedulingProposal>> {
        if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&slot_minutes) {
            return Err(AppError::validation_with_details(
                "slot_minutes out of range",
                json!({"slot_minutes": slot_minutes, "min": MIN_SLOT_MINUTES, "max": MAX_SLOT_MINUTES}),
            ));
        }
        if !(MIN_MAX_PROPOSALS..=MAX_MAX_PROPOSALS).contains(&max_proposals) {
            return Err(AppError::validation_with_details(
                "max_proposals out of range",
                json!({"max_proposals": max_proposals, "min": MIN_MAX_PROPOSALS, "max": MAX_MAX_PROPOSALS}),
            ));
        }

        let free_intervals = free_slot_finder::find(profile, existing_blocks, horizon_start, horizon_end);

        let strategies = Strategy::ORDER
            .into_iter()
            .take(max_proposals as usize)
            .collect::<Vec<_>>();

        let tz = time_algebra::parse_tz(&profile.timezone);

        let mut proposals = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let proposal = Self::build_one(
                strategy,
                &candidates,
                free_intervals.clone(),
                &profile.preferences.deep_work_windows,
                slot_minutes,
                tz,
            )?;
            proposals.push(proposal);
        }
        Ok(proposals)
    }

    fn build_one(
        strategy: Strategy,
        candidates: &[Task],
        mut free: Vec<Interval>,
        deep_work_windows: &[DeepWorkWindow],
        slot_minutes: i64,
        tz: Tz,
    ) -> AppResult<SchedulingProposal> {
        let ordered = order_tasks(candidates, strategy);
        let mut placed = Vec::new();
        let mut changes = Vec::new();

        for task in &ordered {
            let required = required_minutes(task.effort_minutes, slot_minutes);
            let pick = pick_interval(&free, required, strategy, task.due, deep_work_windows, tz);
            let Some((idx, start)) = pick else {
                continue;
            };
            let end = start + chrono::Duration::minutes(required);
            let kind = if required < FOCUS_BLOCK_THRESHOLD_MINUTES {
                "task_block"
            } else {
                "focus_block"
            };

            let payload = CreateBlockPayload {
                kind: kind.to_string(),
                title: task.title.clone(),
                start,
                end,
                task_id: Some(task.id.clone()),
            };
            changes.push(SchedulingChange {
                id: Uuid::new_v4().to_string(),
                kind: "create_block".to_string(),
                payload: serde_json::to_value(&payload)?,
            });
            placed.push(PlacedBlock {
                task_id: task.id.clone(),
                start,
                end,
                due: task.due,
            });

            // Shrink the picked interval to [end, interval.end), dropping it if empty.
            let picked = free[idx];
            free.remove(idx);
            if let Ok(remainder) = Interval::new(end, picked.end) {
                free.push(remainder);
                free.sort_by_key(|iv| iv.start);
            }
        }

        let score = score_proposal(&placed);
        let now = Utc::now();
        let proposal = SchedulingProposal {
            id: Uuid::new_v4().to_string(),
            summary: format!("{} strategy: {} block(s) proposed", strategy.as_str(), changes.len()),
            explanation: json!({
                "strategy": strategy.as_str(),
                "slotMinutes": slot_minutes,
                "candidateCount": candidates.len(),
                "placedCount": placed.len(),
            }),
            score: score.to_json(),
            status: "draft".to_string(),
            horizon_from: placed.iter().map(|p| p.start).min(),
            horizon_to: placed.iter().map(|p| p.end).max(),
            changes,
            created_at: now,
            updated_at: now,
        };
        Ok(proposal)
    }
}

/// `required = max(slot_minutes, ceil(effort/slot_minutes)*slot_minutes)`, capped at 120.
fn required_minutes(effort_minutes: i64, slot_minutes: i64) -> i64 {
    let rounded_up = ((effort_minutes + slot_minutes - 1) / slot_minutes) * slot_minutes;
    rounded_up.max(slot_minutes).min(REQUIRED_MINUTES_CAP)
}

fn order_tasks(tasks: &[Task], strategy: Strategy) -> Vec<Task> {
    let mut tasks = tasks.to_vec();
    match strategy {
        Strategy::Stable => tasks.sort_by(|a, b| {
            b.priority_rank()
                .cmp(&a.priority_rank())
                .then_with(|| compare_due_asc_none_last(a.due, b.due))
        }),
        Strategy::Urgent => tasks.sort_by(|a, b| {
            compare_due_asc_none_last(a.due, b.due).then_with(|| b.priority_rank().cmp(&a.priority_rank()))
        }),
        Strategy::Focus => tasks.sort_by(|a, b| {
            let a_effort = a.effort_minutes.max(30);
            let b_effort = b.effort_minutes.max(30);
            b_effort
                .cmp(&a_effort)
                .then_with(|| b.priority_rank().cmp(&a.priority_rank()))
                .then_with(|| compare_due_asc_none_last(a.due, b.due))
        }),
    }
    tasks
}

fn compare_due_asc_none_last(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Picks the free interval (by index) with the minimum strategy score among
/// those with at least `required` minutes, breaking ties by earliest start.
fn pick_interval(
    free: &[Interval],
    required: i64,
    strategy: Strategy,
    due: Option<DateTime<Utc>>,
    deep_work_windows: &[DeepWorkWindow],
    tz: Tz,
) -> Option<(usize, DateTime<Utc>)> {
    free.iter()
        .enumerate()
        .filter(|(_, iv)| iv.duration_minutes() >= required)
        .map(|(idx, iv)| {
            let score = interval_score(*iv, required, strategy, due, deep_work_windows, tz);
            (idx, iv.start, score)
        })
        .min_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        })
        .map(|(idx, start, _)| (idx, start))
}

fn interval_score(
    interval: Interval,
    required: i64,
    strategy: Strategy,
    due: Option<DateTime<Utc>>,
    deep_work_windows: &[DeepWorkWindow],
    tz: Tz,
) -> f64 {
    let start_seconds = interval.start.timestamp() as f64;
    match strategy {
        Strategy::Stable => start_seconds,
        Strategy::Urgent => {
            let interval_end = interval.start + chrono::Duration::minutes(required);
            let lateness_penalty = due
                .filter(|due| interval_end > *due)
                .map(|due| (interval_end - due).num_minutes() as f64 * 5.0)
                .unwrap_or(0.0);
            start_seconds + lateness_penalty
        }
        Strategy::Focus => {
            let bonus = focus_bonus(interval, required, deep_work_windows, tz);
            start_seconds - 60.0 * bonus
        }
    }
}

/// Weighted sum of overlap-minutes between `[interval.start, interval.start+required)`
/// and any configured deep-work window falling on that weekday, both resolved
/// in the profile's local timezone (a window's weekday is a local concept).
fn focus_bonus(interval: Interval, required: i64, windows: &[DeepWorkWindow], tz: Tz) -> f64 {
    let candidate_end = interval.start + chrono::Duration::minutes(required);
    let local_start = time_algebra::coerce_tz(interval.start, tz);
    let weekday = day_key(local_start.weekday());
    let mut total = 0.0;
    for window in windows {
        if window.day != weekday {
            continue;
        }
        let (Some(w_start), Some(w_end)) = (parse_hm(&window.start), parse_hm(&window.end)) else {
            continue;
        };
        let date = local_start.date_naive();
        let (Some(window_start), Some(window_end)) = (
            time_algebra::local_datetime_to_utc(date, w_start, tz),
            time_algebra::local_datetime_to_utc(date, w_end, tz),
        ) else {
            continue;
        };
        let overlap_start = interval.start.max(window_start);
        let overlap_end = candidate_end.min(window_end);
        if overlap_end > overlap_start {
            let minutes = (overlap_end - overlap_start).num_minutes() as f64;
            total += minutes * window.weight;
        }
    }
    total
}

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

fn score_proposal(placed: &[PlacedBlock]) -> ProposalScore {
    let mut lateness_minutes = 0.0;
    let mut deep_work_minutes = 0.0;
    for block in placed {
        if let Some(due) = block.due {
            if block.end > due {
                lateness_minutes += (block.end - due).num_minutes().max(0) as f64;
            }
        }
        let duration = (block.end - block.start).num_minutes();
        if duration >= FOCUS_BLOCK_THRESHOLD_MINUTES {
            deep_work_minutes += duration as f64;
        }
    }
    let changes_count = placed.len() as i64;
    let raw = 1000.0 - lateness_minutes - 10.0 * changes_count as f64 + 0.5 * deep_work_minutes;
    let objective_value = (raw.max(0.0) * 100.0).round() / 100.0;
    ProposalScore {
        lateness_minutes,
        deep_work_minutes,
        changes_count,
        objective_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::{Preferences, WorkingHours};
    use chrono::TimeZone as _;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        // 2026-08-03 is a Monday.
        Utc.with_ymd_and_hms(2026, 8, 3, hour, minute, 0).unwrap()
    }

    fn task(id: &str, priority: &str, due: Option<DateTime<Utc>>, effort: i64) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: None,
            status: "todo".to_string(),
            priority: priority.to_string(),
            due,
            effort_minutes: effort,
            project_id: None,
            source: "manual".to_string(),
            source_ref: None,
            version: 1,
            created_at: at(0, 0),
            updated_at: at(0, 0),
        }
    }

    fn profile() -> Profile {
        Profile {
            id: "default".into(),
            timezone: "UTC".into(),
            autonomy_level: "L2".into(),
            working_hours: WorkingHours::default(),
            preferences: Preferences::default(),
            version: 1,
            created_at: at(0, 0),
            updated_at: at(0, 0),
        }
    }

    #[test]
    fn required_minutes_caps_at_two_hours() {
        assert_eq!(required_minutes(500, 30), 120);
        assert_eq!(required_minutes(10, 30), 30);
        assert_eq!(required_minutes(45, 30), 60);
    }

    #[test]
    fn stable_strategy_orders_by_priority_then_due() {
        let tasks = vec![
            task("a", "low", None, 30),
            task("b", "critical", None, 30),
            task("c", "high", Some(at(10, 0)), 30),
        ];
        let ordered = order_tasks(&tasks, Strategy::Stable);
        assert_eq!(ordered[0].id, "b");
        assert_eq!(ordered[1].id, "c");
        assert_eq!(ordered[2].id, "a");
    }

    #[test]
    fn generate_produces_one_proposal_per_requested_strategy() {
        let p = profile();
        let candidates = vec![task("a", "high", None, 60)];
        let horizon_end = at(0, 0) + chrono::Duration::days(3);
        let proposals = Scheduler::generate(&p, at(0, 0), horizon_end, candidates, &[], 30, 2).unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].status, "draft");
    }
}
