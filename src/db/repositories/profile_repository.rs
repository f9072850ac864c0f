use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::AppResult;
use crate::models::profile::{Preferences, Profile, WorkingHours};

const SINGLETON_ID: &str = "default";

pub struct ProfileRepository;

impl ProfileRepository {
    /// Profile is a singleton row; creates the default one on first access.
    pub fn get_or_create(conn: &Connection) -> AppResult<Profile> {
        let sql = "SELECT id, timezone, autonomy_level, working_hours, preferences, version, \
            created_at, updated_at FROM profile WHERE id = ?1";
        match conn.query_row(sql, [SINGLETON_ID], row_to_profile) {
            Ok(profile) => Ok(profile),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let now = Utc::now();
                let profile = Profile {
                    id: SINGLETON_ID.to_string(),
                    timezone: "UTC".to_string(),
                    autonomy_level: "L2".to_string(),
                    working_hours: WorkingHours::default(),
                    preferences: Preferences::default(),
                    version: 1,
                    created_at: now,
                    updated_at: now,
                };
                Self::insert(conn, &profile)?;
                Ok(profile)
            }
            Err(other) => Err(other.into()),
        }
    }

    fn insert(conn: &Connection, profile: &Profile) -> AppResult<()> {
        conn.execute(
            "INSERT INTO profile (id, timezone, autonomy_level, working_hours, preferences, \
                version, created_at, updated_at) \
             VALUES (:id, :timezone, :autonomy_level, :working_hours, :preferences, :version, \
                :created_at, :updated_at)",
            named_params! {
                ":id": profile.id,
                ":timezone": profile.timezone,
                ":autonomy_level": profile.autonomy_level,
                ":working_hours": serde_json::to_string(&profile.working_hours)?,
                ":preferences": serde_json::to_string(&profile.preferences)?,
                ":version": profile.version,
                ":created_at": profile.created_at.to_rfc3339(),
                ":updated_at": profile.updated_at.to_rfc3339(),
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, profile: &Profile) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE profile SET timezone = :timezone, autonomy_level = :autonomy_level, \
                working_hours = :working_hours, preferences = :preferences, version = :version, \
                updated_at = :updated_at WHERE id = :id",
            named_params! {
                ":id": profile.id,
                ":timezone": profile.timezone,
                ":autonomy_level": profile.autonomy_level,
                ":working_hours": serde_json::to_string(&profile.working_hours)?,
                ":preferences": serde_json::to_string(&profile.preferences)?,
                ":version": profile.version,
                ":updated_at": profile.updated_at.to_rfc3339(),
            },
        )?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found("profile not found"));
        }
        Ok(())
    }
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let working_hours_json: String = row.get("working_hours")?;
    let preferences_json: String = row.get("preferences")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Profile {
        id: row.get("id")?,
        timezone: row.get("timezone")?,
        autonomy_level: row.get("autonomy_level")?,
        working_hours: serde_json::from_str(&working_hours_json).unwrap_or_default(),
        preferences: serde_json::from_str(&preferences_json).unwrap_or_default(),
        version: row.get("version")?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
