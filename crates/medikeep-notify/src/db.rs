use rusqlite::Connection;

use crate::error::Result;

/// Initialise the notification schema in `conn`.
///
/// Creates the `notifications` table (idempotent) and an index on
/// `created_at` so the newest-first listing stays cheap.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT    NOT NULL PRIMARY KEY,
            kind        TEXT    NOT NULL,   -- 'success' | 'failure'
            subject     TEXT    NOT NULL,
            message     TEXT    NOT NULL,
            attachment  TEXT,               -- JSON artifact descriptor or NULL
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT    NOT NULL    -- ISO-8601
        ) STRICT;

        -- Newest-first listing and cap eviction both sort on created_at.
        CREATE INDEX IF NOT EXISTS idx_notifications_created
            ON notifications (created_at DESC, id DESC);
        ",
    )?;
    Ok(())
}
