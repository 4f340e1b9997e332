use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                surname     TEXT NOT NULL,
                role        TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_users_role ON users(role);

            -- Timestamps below are store-assigned epoch milliseconds.
            CREATE TABLE chats (
                id                      TEXT PRIMARY KEY,
                created_at              INTEGER NOT NULL,
                last_message_id         TEXT,
                last_message_text       TEXT,
                last_message_sender_id  TEXT,
                last_message_timestamp  INTEGER,
                last_message_read       INTEGER
            );

            CREATE TABLE chat_participants (
                chat_id         TEXT NOT NULL REFERENCES chats(id),
                user_id         TEXT NOT NULL,
                position        INTEGER NOT NULL,
                name            TEXT NOT NULL,
                surname         TEXT NOT NULL,
                role            TEXT NOT NULL,
                unread_count    INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE INDEX idx_chat_participants_user ON chat_participants(user_id);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                chat_id         TEXT NOT NULL REFERENCES chats(id),
                sender_id       TEXT NOT NULL,
                sender_name     TEXT NOT NULL,
                text            TEXT NOT NULL,
                attachment_name TEXT,
                attachment_type TEXT,
                attachment_ref  TEXT,
                timestamp       INTEGER NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, timestamp);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                recipient_id    TEXT NOT NULL,
                sender_id       TEXT NOT NULL,
                sender_name     TEXT NOT NULL,
                title           TEXT NOT NULL,
                message         TEXT NOT NULL,
                type            TEXT NOT NULL,
                link            TEXT,
                created_at      INTEGER NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
