use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use wardline_types::models::StaffProfile;

use crate::Database;
use crate::models::{ChatRecord, ChatRow, MessageRow, NotificationRow, ParticipantRow, UserRow};

impl Database {
    // -- Users --

    /// Insert or refresh a staff profile. Profiles belong to the auth side;
    /// this exists for seeding and tests.
    pub fn put_user(&self, profile: &StaffProfile) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, surname, role) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET name = ?2, surname = ?3, role = ?4",
                (&profile.id, &profile.name, &profile.surname, &profile.role),
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, surname, role FROM users WHERE id = ?1",
                    [id],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn users_with_role(&self, role: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, surname, role FROM users WHERE role = ?1 ORDER BY id")?;
            let rows = stmt
                .query_map([role], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Chats --

    pub fn chat_exists(&self, chat_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM chats WHERE id = ?1", [chat_id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>> {
        self.with_conn(|conn| query_chat(conn, chat_id))
    }

    /// Every conversation `user_id` takes part in, in no particular order.
    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT chat_id FROM chat_participants WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(record) = query_chat(conn, &id)? {
                    records.push(record);
                }
            }
            Ok(records)
        })
    }

    // -- Messages --

    /// The newest `limit` messages of a conversation, oldest first.
    pub fn get_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, sender_name, text,
                        attachment_name, attachment_type, attachment_ref, timestamp, read
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let mut rows = stmt
                .query_map(rusqlite::params![chat_id, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok(rows)
        })
    }

    /// Every unread message of the conversation not sent by `viewer`,
    /// oldest first. Not bounded by the display window.
    pub fn unread_inbound(&self, chat_id: &str, viewer: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_unread_inbound(conn, chat_id, viewer))
    }

    /// The conversation record and its unread inbound messages, read under
    /// one lock so both describe the same committed state.
    pub fn read_state(&self, chat_id: &str, viewer: &str) -> Result<(Option<ChatRecord>, Vec<MessageRow>)> {
        self.with_conn(|conn| {
            let chat = query_chat(conn, chat_id)?;
            let unread = query_unread_inbound(conn, chat_id, viewer)?;
            Ok((chat, unread))
        })
    }

    // -- Notifications --

    /// Newest first.
    pub fn get_notifications(&self, recipient_id: &str, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, sender_id, sender_name, title, message, type, link, created_at, read
                 FROM notifications
                 WHERE recipient_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![recipient_id, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, recipient_id, sender_id, sender_name, title, message, type, link, created_at, read
                     FROM notifications WHERE id = ?1",
                    [id],
                    notification_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        surname: row.get(2)?,
        role: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        text: row.get(4)?,
        attachment_name: row.get(5)?,
        attachment_type: row.get(6)?,
        attachment_ref: row.get(7)?,
        timestamp: row.get(8)?,
        read: row.get(9)?,
    })
}

fn query_unread_inbound(conn: &Connection, chat_id: &str, viewer: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, sender_id, sender_name, text,
                attachment_name, attachment_type, attachment_ref, timestamp, read
         FROM messages
         WHERE chat_id = ?1 AND read = 0 AND sender_id != ?2
         ORDER BY timestamp, rowid",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![chat_id, viewer], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        title: row.get(4)?,
        message: row.get(5)?,
        kind: row.get(6)?,
        link: row.get(7)?,
        created_at: row.get(8)?,
        read: row.get(9)?,
    })
}

fn query_chat(conn: &Connection, chat_id: &str) -> Result<Option<ChatRecord>> {
    let chat = conn
        .query_row(
            "SELECT id, created_at, last_message_id, last_message_text, last_message_sender_id,
                    last_message_timestamp, last_message_read
             FROM chats WHERE id = ?1",
            [chat_id],
            |row| {
                Ok(ChatRow {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    last_message_id: row.get(2)?,
                    last_message_text: row.get(3)?,
                    last_message_sender_id: row.get(4)?,
                    last_message_timestamp: row.get(5)?,
                    last_message_read: row.get(6)?,
                })
            },
        )
        .optional()?;

    let Some(chat) = chat else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT chat_id, user_id, position, name, surname, role, unread_count
         FROM chat_participants WHERE chat_id = ?1 ORDER BY position",
    )?;
    let participants = stmt
        .query_map([chat_id], |row| {
            Ok(ParticipantRow {
                chat_id: row.get(0)?,
                user_id: row.get(1)?,
                position: row.get(2)?,
                name: row.get(3)?,
                surname: row.get(4)?,
                role: row.get(5)?,
                unread_count: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(ChatRecord { chat, participants }))
}

pub(crate) fn participant_ids(conn: &Connection, chat_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY position")?;
    let ids = stmt
        .query_map([chat_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}
