use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const AUTONOMY_LEVELS: [&str; 5] = ["L0", "L1", "L2", "L3", "L4"];
pub const DAY_KEYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Autonomy levels L0-L2 require human approval for destructive/reschedule
/// actions; L3-L4 may act without confirmation (SPEC_FULL.md §3).
pub fn requires_approval(autonomy_level: &str) -> bool {
    matches!(autonomy_level, "L0" | "L1" | "L2")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingDay {
    pub day: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LunchWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingHours {
    pub days: Vec<WorkingDay>,
    #[serde(default)]
    pub lunch: Option<LunchWindow>,
}

impl Default for WorkingHours {
    fn default() -> Self {
        let days = ["mon", "tue", "wed", "thu", "fri"]
            .iter()
            .map(|day| WorkingDay {
                day: day.to_string(),
                start: "09:00".to_string(),
                end: "18:00".to_string(),
            })
            .collect();
        WorkingHours {
            days,
            lunch: Some(LunchWindow {
                start: "12:00".to_string(),
                end: "13:00".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeepWorkWindow {
    pub day: String,
    pub start: String,
    pub end: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Preferences {
    #[serde(default)]
    pub deep_work_windows: Vec<DeepWorkWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub timezone: String,
    pub autonomy_level: String,
    pub working_hours: WorkingHours,
    pub preferences: Preferences,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub autonomy_level: Option<String>,
    #[serde(default)]
    pub working_hours: Option<WorkingHours>,
    #[serde(default)]
    pub preferences: Option<Preferences>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}
