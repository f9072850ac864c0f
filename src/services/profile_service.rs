use chrono::{NaiveTime, Utc};
use tracing::info;

use crate::db::repositories::profile_repository::ProfileRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::profile::{Preferences, Profile, ProfilePatch, WorkingHours, AUTONOMY_LEVELS, DAY_KEYS};

#[derive(Clone)]
pub struct ProfileService {
    db: DbPool,
}

impl ProfileService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn get_profile(&self) -> AppResult<Profile> {
        self.db.with_connection(ProfileRepository::get_or_create)
    }

    pub fn update_profile(&self, patch: ProfilePatch) -> AppResult<Profile> {
        let mut profile = self.get_profile()?;

        if let Some(expected) = patch.expected_version {
            if expected != profile.version {
                return Err(AppError::conflict(format!(
                    "profile version mismatch: expected {expected}, found {}",
                    profile.version
                )));
            }
        }

        if let Some(timezone) = patch.timezone {
            profile.timezone = normalize_timezone(&timezone)?;
        }
        if let Some(autonomy_level) = patch.autonomy_level {
            if !AUTONOMY_LEVELS.contains(&autonomy_level.as_str()) {
                return Err(AppError::validation(format!("unknown autonomy level '{autonomy_level}'")));
            }
            profile.autonomy_level = autonomy_level;
        }
        if let Some(working_hours) = patch.working_hours {
            profile.working_hours = validate_working_hours(working_hours)?;
        }
        if let Some(preferences) = patch.preferences {
            profile.preferences = validate_preferences(preferences)?;
        }

        profile.version += 1;
        profile.updated_at = Utc::now();

        self.db.with_connection(|conn| ProfileRepository::update(conn, &profile))?;
        info!(version = profile.version, "profile updated");
        Ok(profile)
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }
}

fn normalize_timezone(timezone: &str) -> AppResult<String> {
    let trimmed = timezone.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("timezone cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn parse_hm(value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| AppError::validation(format!("'{value}' is not an HH:MM time")))
}

fn validate_working_hours(working_hours: WorkingHours) -> AppResult<WorkingHours> {
    for day in &working_hours.days {
        if !DAY_KEYS.contains(&day.day.as_str()) {
            return Err(AppError::validation(format!("unknown working day key '{}'", day.day)));
        }
        let start = parse_hm(&day.start)?;
        let end = parse_hm(&day.end)?;
        if end <= start {
            return Err(AppError::validation(format!(
                "working hours for '{}' must have end after start",
                day.day
            )));
        }
    }
    if let Some(lunch) = &working_hours.lunch {
        let start = parse_hm(&lunch.start)?;
        let end = parse_hm(&lunch.end)?;
        if end <= start {
            return Err(AppError::validation("lunch window must have end after start"));
        }
    }
    Ok(working_hours)
}

fn validate_preferences(preferences: Preferences) -> AppResult<Preferences> {
    for window in &preferences.deep_work_windows {
        if !DAY_KEYS.contains(&window.day.as_str()) {
            return Err(AppError::validation(format!("unknown deep work day key '{}'", window.day)));
        }
        let start = parse_hm(&window.start)?;
        let end = parse_hm(&window.end)?;
        if end <= start {
            return Err(AppError::validation("deep work window must have end after start"));
        }
        if !(0.0..=1.0).contains(&window.weight) {
            return Err(AppError::validation("deep work window weight must be within 0..1"));
        }
    }
    Ok(preferences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::{DeepWorkWindow, WorkingDay};
    use tempfile::tempdir;

    fn setup_service() -> (ProfileService, tempfile::TempDir) {
        let dir = tempdir().expect("temp dir");
        let pool = DbPool::new(dir.path().join("profile.sqlite")).expect("db pool");
        (ProfileService::new(pool), dir)
    }

    #[test]
    fn get_profile_creates_default_singleton() {
        let (service, _dir) = setup_service();
        let profile = service.get_profile().expect("get profile");
        assert_eq!(profile.id, "default");
        assert_eq!(profile.autonomy_level, "L2");
    }

    #[test]
    fn update_profile_rejects_unknown_autonomy_level() {
        let (service, _dir) = setup_service();
        let result = service.update_profile(ProfilePatch {
            autonomy_level: Some("L9".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[test]
    fn update_profile_rejects_inverted_working_day() {
        let (service, _dir) = setup_service();
        let result = service.update_profile(ProfilePatch {
            working_hours: Some(WorkingHours {
                days: vec![WorkingDay {
                    day: "mon".into(),
                    start: "18:00".into(),
                    end: "09:00".into(),
                }],
                lunch: None,
            }),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[test]
    fn update_profile_rejects_out_of_range_deep_work_weight() {
        let (service, _dir) = setup_service();
        let result = service.update_profile(ProfilePatch {
            preferences: Some(Preferences {
                deep_work_windows: vec![DeepWorkWindow {
                    day: "tue".into(),
                    start: "09:00".into(),
                    end: "11:00".into(),
                    weight: 1.5,
                }],
            }),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[test]
    fn update_profile_bumps_version() {
        let (service, _dir) = setup_service();
        let profile = service.get_profile().expect("get profile");
        let updated = service
            .update_profile(ProfilePatch {
                timezone: Some("America/New_York".into()),
                expected_version: Some(profile.version),
                ..Default::default()
            })
            .expect("update profile");
        assert_eq!(updated.version, profile.version + 1);
        assert_eq!(updated.timezone, "America/New_York");
    }
}
