use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc, Weekday};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::models::meeting::{Meeting, TranscriptUtterance};
use crate::services::llm_client::{LlmClient, LlmPurpose};

const ACTION_HINTS: [&str; 11] = [
    "fix", "review", "send", "prepare", "update", "draft", "schedule", "follow up", "finalize",
    "share", "summarize",
];

const MIN_EFFORT_MINUTES: i64 = 15;
const MAX_EFFORT_MINUTES: i64 = 480;
const DEFAULT_EFFORT_MINUTES: i64 = 60;

/// One action item proposed from a meeting, before persistence (§4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct DraftActionItem {
    pub title: String,
    pub assignee_name: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub effort_minutes: i64,
    pub confidence: f64,
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
struct LlmCandidate {
    title: String,
    #[serde(default)]
    assignee_name: Option<String>,
    #[serde(default)]
    due: Option<String>,
    effort_minutes: i64,
    confidence: f64,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmCandidateList {
    #[serde(default)]
    candidates: Vec<LlmCandidate>,
}

const SYSTEM_PROMPT: &str = "You extract actionable follow-up items from a meeting transcript. \
Respond as JSON: {\"candidates\":[{\"title\":str,\"assignee_name\":str|null,\"due\":str|null,\
\"effort_minutes\":int,\"confidence\":float 0..1,\"rationale\":str}]}. \
\"due\" must be an ISO-8601 instant or null if no date is mentioned.";

pub struct MeetingExtractor;

impl MeetingExtractor {
    /// Primary path is the LLM extractor; any failure (no client configured,
    /// upstream error, malformed JSON) falls back to the deterministic
    /// keyword/regex path so ingestion never blocks on the network.
    pub async fn extract(
        llm: Option<&LlmClient>,
        meeting: &Meeting,
        now: DateTime<Utc>,
    ) -> Vec<DraftActionItem> {
        if let Some(client) = llm {
            if let Ok(candidates) = Self::extract_via_llm(client, meeting, now).await {
                if !candidates.is_empty() {
                    return dedupe_by_title(candidates);
                }
            }
        }
        dedupe_by_title(Self::extract_fallback(meeting, now))
    }

    async fn extract_via_llm(
        client: &LlmClient,
        meeting: &Meeting,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<DraftActionItem>> {
        let payload = json!({
            "summary": meeting.summary,
            "transcript": meeting.transcript,
            "now": now.to_rfc3339(),
        });
        let invocation = client
            .complete_json(LlmPurpose::ActionItemExtraction, SYSTEM_PROMPT, &payload)
            .await?;
        let parsed: LlmCandidateList = serde_json::from_value(invocation.content)?;

        Ok(parsed
            .candidates
            .into_iter()
            .map(|c| DraftActionItem {
                title: c.title.trim().to_string(),
                assignee_name: c.assignee_name,
                due: c
                    .due
                    .as_deref()
                    .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                    .map(|d| d.with_timezone(&Utc)),
                effort_minutes: c.effort_minutes.clamp(MIN_EFFORT_MINUTES, MAX_EFFORT_MINUTES),
                confidence: c.confidence.clamp(0.0, 1.0),
                rationale: c.rationale.unwrap_or_default(),
            })
            .filter(|c| !c.title.is_empty())
            .collect())
    }

    fn extract_fallback(meeting: &Meeting, now: DateTime<Utc>) -> Vec<DraftActionItem> {
        let mut lines: Vec<(String, String)> = meeting
            .transcript
            .iter()
            .filter_map(|u| {
                let text = u.text.trim();
                if text.is_empty() {
                    return None;
                }
                let speaker = u.speaker.clone().unwrap_or_else(|| "participant".to_string());
                Some((speaker, text.to_string()))
            })
            .collect();

        if let Some(summary) = &meeting.summary {
            if !summary.trim().is_empty() {
                lines.push(("summary".to_string(), summary.trim().to_string()));
            }
        }

        let mut candidates = Vec::new();
        for (speaker, text) in lines {
            let lowered = text.to_lowercase();
            let has_hint = ACTION_HINTS.iter().any(|hint| lowered.contains(hint));
            let has_deadline_marker = lowered.contains("until") || lowered.contains("by ") || lowered.contains(" by");
            if !has_hint && !has_deadline_marker {
                continue;
            }

            let assignee = extract_assignee(&text).unwrap_or_else(|| speaker.clone());
            let due = parse_due(&text, now);
            let effort = parse_effort(&text);
            let title = extract_title(&text);
            if title.chars().count() < 6 {
                continue;
            }

            let confidence = confidence_score(due.is_some(), true, has_hint, effort);
            let mut rationale_parts = Vec::new();
            if has_hint {
                rationale_parts.push("action verb detected");
            }
            if due.is_some() {
                rationale_parts.push("deadline phrase detected");
            }
            rationale_parts.push("assignee inferred");
            if rationale_parts.is_empty() {
                rationale_parts.push("possible follow-up in meeting context");
            }

            candidates.push(DraftActionItem {
                title,
                assignee_name: Some(assignee),
                due,
                effort_minutes: effort,
                confidence,
                rationale: rationale_parts.join(", "),
            });
        }
        candidates
    }
}

fn dedupe_by_title(candidates: Vec<DraftActionItem>) -> Vec<DraftActionItem> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.title.to_lowercase()))
        .collect()
}

fn extract_assignee(text: &str) -> Option<String> {
    let re = Regex::new(r"\b([A-Z][a-z]{1,19})\s+(?:will|should|to|needs to)\b").ok()?;
    re.captures(text).map(|cap| cap[1].to_string())
}

fn parse_effort(text: &str) -> i64 {
    let lowered = text.to_lowercase();
    if let Some(re) = Regex::new(r"(\d+)\s*hour").ok() {
        if let Some(caps) = re.captures(&lowered) {
            if let Ok(hours) = caps[1].parse::<i64>() {
                return (hours * 60).clamp(30, MAX_EFFORT_MINUTES);
            }
        }
    }
    if let Some(re) = Regex::new(r"(\d+)\s*min").ok() {
        if let Some(caps) = re.captures(&lowered) {
            if let Ok(minutes) = caps[1].parse::<i64>() {
                return minutes.clamp(MIN_EFFORT_MINUTES, MAX_EFFORT_MINUTES);
            }
        }
    }
    DEFAULT_EFFORT_MINUTES
}

fn extract_title(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let leading_markers = Regex::new(r"(?i)^(so|well|um|uh|okay|alright)[,:]?\s*").unwrap();
    let cleaned = leading_markers.replace(&collapsed, "").trim().to_string();
    if cleaned.chars().count() > 120 {
        let truncated: String = cleaned.chars().take(117).collect();
        format!("{truncated}...")
    } else {
        cleaned
    }
}

fn parse_due(text: &str, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = text.to_lowercase();
    let date = if lowered.contains("tomorrow") {
        base.date_naive().succ_opt()?
    } else if lowered.contains("today") {
        base.date_naive()
    } else if let Some(weekday) = find_next_weekday(&lowered) {
        next_weekday_date(base.date_naive(), weekday)
    } else if let Some(date) = parse_iso_date(text) {
        date
    } else if let Some(date) = parse_slash_date(text, base.year()) {
        date
    } else {
        return None;
    };

    let time = parse_time_of_day(&lowered).unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    use chrono::TimeZone;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let re = Regex::new(r"(\d{4})-(\d{2})-(\d{2})").ok()?;
    let caps = re.captures(text)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_slash_date(text: &str, base_year: i32) -> Option<NaiveDate> {
    let re = Regex::new(r"(\d{1,2})/(\d{1,2})").ok()?;
    let caps = re.captures(text)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    NaiveDate::from_ymd_opt(base_year, month, day)
}

/// Parses a trailing time-of-day expression such as "5pm", "5:30 pm", or the
/// 24-hour "17:00". `parse_due` falls back to 23:59 when this returns `None`.
fn parse_time_of_day(lowered: &str) -> Option<NaiveTime> {
    if let Ok(re) = Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b") {
        if let Some(caps) = re.captures(lowered) {
            let mut hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let is_pm = &caps[3] == "pm";
            if hour == 12 {
                hour = 0;
            }
            if is_pm {
                hour += 12;
            }
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }
    }
    if let Ok(re) = Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b") {
        if let Some(caps) = re.captures(lowered) {
            let hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = caps[2].parse().ok()?;
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }
    }
    None
}

fn find_next_weekday(lowered: &str) -> Option<Weekday> {
    const DAYS: [(&str, Weekday); 7] = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];
    DAYS.iter().find(|(name, _)| lowered.contains(name)).map(|(_, day)| *day)
}

fn next_weekday_date(from: NaiveDate, target: Weekday) -> NaiveDate {
    let mut date = from;
    for _ in 0..7 {
        date += ChronoDuration::days(1);
        if date.weekday() == target {
            return date;
        }
    }
    from
}

fn confidence_score(has_due: bool, has_assignee: bool, has_action_hint: bool, effort_minutes: i64) -> f64 {
    let mut score = 0.35;
    if has_action_hint {
        score += 0.25;
    }
    if has_due {
        score += 0.2;
    }
    if has_assignee {
        score += 0.15;
    }
    if effort_minutes > 180 {
        score -= 0.1;
    }
    score.clamp(0.2, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
    }

    fn meeting_with(lines: &[(&str, &str)]) -> Meeting {
        Meeting {
            id: "m1".into(),
            title: Some("Sync".into()),
            started_at: Some(at(1, 10)),
            ended_at: Some(at(1, 11)),
            summary: None,
            transcript: lines
                .iter()
                .enumerate()
                .map(|(i, (speaker, text))| TranscriptUtterance {
                    ts_ms: i as i64 * 1000,
                    speaker: Some(speaker.to_string()),
                    text: text.to_string(),
                })
                .collect(),
            extraction_status: "pending".into(),
            created_at: at(1, 10),
            updated_at: at(1, 10),
        }
    }

    #[test]
    fn fallback_extracts_candidate_with_action_hint() {
        let meeting = meeting_with(&[("Alice", "Bob will review the proposal draft tomorrow")]);
        let candidates = MeetingExtractor::extract_fallback(&meeting, at(1, 9));
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].confidence > 0.5);
        assert_eq!(candidates[0].due, Some(Utc.with_ymd_and_hms(2026, 8, 2, 23, 59, 0).unwrap()));
    }

    #[test]
    fn fallback_parses_a_trailing_time_of_day() {
        let meeting = meeting_with(&[("Alice", "Alice will draft report by tomorrow 5pm")]);
        let candidates = MeetingExtractor::extract_fallback(&meeting, at(1, 9));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].due, Some(Utc.with_ymd_and_hms(2026, 8, 2, 17, 0, 0).unwrap()));
    }

    #[test]
    fn fallback_skips_lines_without_hint_or_deadline() {
        let meeting = meeting_with(&[("Alice", "That sounds reasonable to me")]);
        let candidates = MeetingExtractor::extract_fallback(&meeting, at(1, 9));
        assert!(candidates.is_empty());
    }

    #[test]
    fn dedupe_collapses_same_title_case_insensitively() {
        let items = vec![
            DraftActionItem {
                title: "Send the report".into(),
                assignee_name: None,
                due: None,
                effort_minutes: 60,
                confidence: 0.5,
                rationale: String::new(),
            },
            DraftActionItem {
                title: "send the report".into(),
                assignee_name: None,
                due: None,
                effort_minutes: 60,
                confidence: 0.6,
                rationale: String::new(),
            },
        ];
        assert_eq!(dedupe_by_title(items).len(), 1);
    }
}
