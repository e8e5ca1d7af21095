//! Idempotent schema initialization and the migration ledger (SS6).

use rusqlite::Connection;

use crate::error::StoreResult;

/// Bump when a breaking schema change ships; `initialize_schema` records
/// this in `schema_version` the first time it runs against a fresh file.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS videos (
    video_id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    file_path TEXT NOT NULL,
    duration REAL NOT NULL,
    thumbnail_path TEXT,
    upload_timestamp TEXT NOT NULL,
    processing_status TEXT NOT NULL DEFAULT 'pending',
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS video_context (
    context_id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL REFERENCES videos(video_id),
    context_type TEXT NOT NULL,
    timestamp REAL,
    data TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    tool_version TEXT NOT NULL,
    model_version TEXT,
    processing_params TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS data_lineage (
    lineage_id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL REFERENCES videos(video_id),
    context_id TEXT,
    operation TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    tool_version TEXT NOT NULL,
    model_version TEXT,
    parameters TEXT,
    user_id TEXT,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_video_context_video_ts
    ON video_context(video_id, timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_video_context_type
    ON video_context(video_id, context_type, timestamp);

CREATE INDEX IF NOT EXISTS idx_videos_processing_status
    ON videos(processing_status);

CREATE INDEX IF NOT EXISTS idx_videos_deleted_at
    ON videos(deleted_at);

CREATE INDEX IF NOT EXISTS idx_data_lineage_video_ts
    ON data_lineage(video_id, timestamp DESC);
"#;

pub fn initialize(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let already_recorded: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM schema_version WHERE version = ?1)",
        [CURRENT_SCHEMA_VERSION],
        |row| row.get(0),
    )?;
    if !already_recorded {
        conn.execute(
            "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, datetime('now'))",
            rusqlite::params![CURRENT_SCHEMA_VERSION, "initial schema"],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
