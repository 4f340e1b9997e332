pub mod batch;
pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Result;
use rusqlite::Connection;
use tokio::sync::broadcast;
use tracing::info;

pub use batch::{CommitReceipt, NewMessage, NewNotification, WriteBatch, WriteOp};

/// Capacity of the change feed. Slow subscribers that fall further behind
/// than this see `Lagged` and re-query.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// A committed change, published after the transaction that caused it.
/// Carries only identity; subscribers re-read the affected records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Change {
    /// The conversation record (summary, unread counts) changed.
    Chat { chat_id: String, participants: Vec<String> },
    /// A message was added to, or updated in, the conversation.
    Messages { chat_id: String },
    /// A notification addressed to `recipient_id` was created or updated.
    Notifications { recipient_id: String },
}

pub struct Database {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<Change>,
    /// Last server timestamp handed out, epoch millis.
    last_timestamp: AtomicI64,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        let last: i64 = conn.query_row(
            "SELECT COALESCE(MAX(ts), 0) FROM (
                SELECT MAX(timestamp) AS ts FROM messages
                UNION ALL SELECT MAX(created_at) FROM chats
                UNION ALL SELECT MAX(created_at) FROM notifications
            )",
            [],
            |r| r.get(0),
        )?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
            last_timestamp: AtomicI64::new(last),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }

    /// Subscribe to committed changes.
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    fn publish(&self, change: Change) {
        // No receivers is fine: nobody is watching.
        let _ = self.changes.send(change);
    }

    /// Hand out a server timestamp strictly greater than every earlier one,
    /// even if the wall clock stalls or steps backwards.
    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        match self
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        {
            Ok(prev) | Err(prev) => now.max(prev + 1),
        }
    }
}

pub(crate) fn millis_to_datetime(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_timestamps_strictly_increase() {
        let db = Database::open_in_memory().unwrap();
        let mut prev = db.next_timestamp();
        for _ in 0..1000 {
            let ts = db.next_timestamp();
            assert!(ts > prev);
            prev = ts;
        }
    }

    #[test]
    fn clock_resumes_past_persisted_timestamps() {
        let dir = std::env::temp_dir().join(format!("wardline_db_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.db");

        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        {
            let db = Database::open(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute("INSERT INTO chats (id, created_at) VALUES ('a_b', ?1)", [future])?;
                Ok(())
            })
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert!(db.next_timestamp() > future);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
