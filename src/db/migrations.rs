use rusqlite::Connection;
use tracing::info;

use crate::error::AppResult;

const USER_VERSION: i32 = 1;

/// Sequential, `PRAGMA user_version`-gated migrations applied after
/// `schema.sql`. `schema.sql` is idempotent (`CREATE TABLE IF NOT EXISTS`)
/// and covers the full v1 shape, so v1 has nothing further to do; this
/// runner exists so later schema changes have a place to land without
/// touching `schema.sql` retroactively.
pub fn run(conn: &Connection) -> AppResult<()> {
    let mut current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version < 1 {
        info!(target: "aawo::db", version = current_version, "running migration v1");
        current_version = 1;
        conn.execute(&format!("PRAGMA user_version = {current_version}"), [])?;
    }

    if current_version != USER_VERSION {
        conn.execute(&format!("PRAGMA user_version = {USER_VERSION}"), [])?;
    }

    Ok(())
}
