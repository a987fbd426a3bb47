use std::sync::Mutex;

use chrono::{DateTime, Utc};
use medikeep_scheduler::BackupArtifact;
use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Notification, NotificationKind};

/// How many notifications are retained. Older entries are evicted whenever a
/// new one is recorded.
pub const MAX_STORED: usize = 50;

/// Thread-safe store for the backup activity log.
///
/// Wraps a single SQLite connection in a `Mutex`. Writes are rare (one per
/// backup attempt plus read-flag flips), so a Mutex is sufficient for the
/// single-node target.
pub struct NotificationStore {
    db: Mutex<Connection>,
}

impl NotificationStore {
    /// Wrap an already-open connection, initialising the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Append an entry and evict everything beyond the newest [`MAX_STORED`].
    #[instrument(skip(self, message, attachment), fields(kind = %kind, subject))]
    pub fn record(
        &self,
        kind: NotificationKind,
        subject: &str,
        message: &str,
        attachment: Option<&BackupArtifact>,
    ) -> Result<Notification> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let attachment_json = attachment.map(serde_json::to_string).transpose()?;

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO notifications (id, kind, subject, message, attachment, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            rusqlite::params![
                id,
                kind.to_string(),
                subject,
                message,
                attachment_json,
                now.to_rfc3339()
            ],
        )?;
        // Evict past the cap. RFC 3339 strings sort chronologically; the id
        // breaks ties between same-instant inserts.
        db.execute(
            "DELETE FROM notifications WHERE id NOT IN (
                 SELECT id FROM notifications
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1
             )",
            rusqlite::params![MAX_STORED as i64],
        )?;
        debug!(notification_id = %id, "notification recorded");

        Ok(Notification {
            id,
            kind,
            subject: subject.to_string(),
            message: message.to_string(),
            timestamp: now,
            read: false,
            attachment: attachment.cloned(),
        })
    }

    /// List entries newest first, at most `limit` of them.
    #[instrument(skip(self), fields(limit))]
    pub fn list(&self, limit: usize) -> Result<Vec<Notification>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, kind, subject, message, attachment, read, created_at
             FROM notifications
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_notification)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Flip the read flag on one entry. Returns `false` if the id is unknown.
    #[instrument(skip(self), fields(id))]
    pub fn mark_read(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1",
            rusqlite::params![id],
        )?;
        Ok(rows_changed > 0)
    }

    /// Number of entries that have not been marked read.
    pub fn unread_count(&self) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM notifications WHERE read = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Map a SQLite row to a `Notification`.
fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind_str: String = row.get(1)?;
    // Unknown kinds read back as failures rather than dropping the row.
    let kind = kind_str.parse().unwrap_or(NotificationKind::Failure);
    let attachment: Option<String> = row.get(4)?;
    let attachment = attachment.and_then(|json| serde_json::from_str(&json).ok());
    let created_at: String = row.get(6)?;
    let timestamp = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Notification {
        id: row.get(0)?,
        kind,
        subject: row.get(2)?,
        message: row.get(3)?,
        timestamp,
        read: row.get::<_, i64>(5)? != 0,
        attachment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> NotificationStore {
        NotificationStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn record_and_list_newest_first() {
        let store = store();
        store
            .record(NotificationKind::Success, "Backup completed", "first", None)
            .unwrap();
        store
            .record(NotificationKind::Failure, "Backup failed", "second", None)
            .unwrap();

        let listed = store.list(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].message, "second");
        assert_eq!(listed[0].kind, NotificationKind::Failure);
        assert_eq!(listed[1].message, "first");
        assert!(!listed[0].read);
    }

    #[test]
    fn cap_evicts_the_oldest_entries() {
        let store = store();
        for i in 0..MAX_STORED {
            store
                .record(
                    NotificationKind::Success,
                    "Backup completed",
                    &format!("run {i}"),
                    None,
                )
                .unwrap();
        }
        assert_eq!(store.list(100).unwrap().len(), MAX_STORED);

        store
            .record(NotificationKind::Success, "Backup completed", "one over", None)
            .unwrap();

        let listed = store.list(100).unwrap();
        assert_eq!(listed.len(), MAX_STORED);
        assert_eq!(listed[0].message, "one over");
        assert!(listed.iter().all(|n| n.message != "run 0"));
    }

    #[test]
    fn mark_read_flips_the_flag_and_reports_unknown_ids() {
        let store = store();
        let n = store
            .record(NotificationKind::Failure, "Backup failed", "boom", None)
            .unwrap();

        assert_eq!(store.unread_count().unwrap(), 1);
        assert!(store.mark_read(&n.id).unwrap());
        assert_eq!(store.unread_count().unwrap(), 0);
        assert!(store.list(10).unwrap()[0].read);

        assert!(!store.mark_read("no-such-id").unwrap());
    }

    #[test]
    fn attachment_round_trips_through_sqlite() {
        let store = store();
        let artifact = BackupArtifact {
            filename: "backup-20260823-230000.json".into(),
            size: 4096,
            download_url: "https://example.com/backup.json".into(),
        };
        store
            .record(
                NotificationKind::Success,
                "Backup completed",
                "uploaded",
                Some(&artifact),
            )
            .unwrap();

        let listed = store.list(1).unwrap();
        let stored = listed[0].attachment.as_ref().unwrap();
        assert_eq!(stored.filename, artifact.filename);
        assert_eq!(stored.size, 4096);
        assert_eq!(stored.download_url, artifact.download_url);
    }
}
