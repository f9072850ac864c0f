use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only global mutable state in the system (SPEC_FULL.md §9): modeled as
/// a single persisted row guarded by transactional updates, never an
/// in-memory global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub connected: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_throttle_at: Option<DateTime<Utc>>,
    pub recent_throttle_count: i64,
    pub updated_at: DateTime<Utc>,
}
