//! Schema migrations.
//!
//! Idempotent; safe to run on every startup.

use rusqlite::Connection;

use crate::errors::Result;

/// Create the document tables if they do not exist.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS process_documents (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            schema_ref  TEXT NOT NULL,
            written_by  TEXT,
            document    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_process_documents_name
            ON process_documents (name);

        CREATE TABLE IF NOT EXISTS log_documents (
            id          TEXT PRIMARY KEY,
            schema_ref  TEXT NOT NULL,
            process_id  TEXT,
            address     TEXT,
            written_by  TEXT,
            document    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_log_documents_process_id
            ON log_documents (process_id);",
    )?;
    Ok(())
}
