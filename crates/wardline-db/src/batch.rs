//! Atomic multi-record writes.
//!
//! A [`WriteBatch`] collects operations and [`Database::commit`] applies them
//! in one SQLite transaction: all of them land or none do. Every operation in
//! a batch shares one server timestamp. Change events are published only
//! after the transaction commits, one per affected record.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Transaction;
use tracing::debug;
use uuid::Uuid;

use wardline_types::models::{Attachment, NotificationKind, ParticipantProfile};

use crate::queries::participant_ids;
use crate::{Change, Database, millis_to_datetime};

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub link: Option<String>,
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create-if-absent. Racing creators of the same id converge on the
    /// first committed record.
    CreateChat {
        chat_id: String,
        participants: [(String, ParticipantProfile); 2],
    },
    InsertMessage { id: String, message: NewMessage },
    /// Point the conversation summary at a message of this batch (unread).
    SetLastMessage {
        chat_id: String,
        message_id: String,
        text: String,
        sender_id: String,
    },
    IncrementUnread { chat_id: String, user_id: String },
    ResetUnread { chat_id: String, user_id: String },
    /// Only flips unread messages; read never reverts.
    MarkMessagesRead { chat_id: String, message_ids: Vec<String> },
    /// Only applies while the summary still points at `message_id`.
    MarkLastMessageRead { chat_id: String, message_id: String },
    InsertNotification { id: String, notification: NewNotification },
    MarkNotificationRead { id: String, recipient_id: String },
}

#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

#[derive(Debug, Clone, Copy)]
pub struct CommitReceipt {
    /// Server timestamp assigned to every record written by the batch.
    pub timestamp: DateTime<Utc>,
    /// Number of rows actually changed.
    pub changed: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Queue a message; returns the store-assigned id.
    pub fn insert_message(&mut self, message: NewMessage) -> String {
        let id = Uuid::new_v4().to_string();
        self.ops.push(WriteOp::InsertMessage { id: id.clone(), message });
        id
    }

    /// Queue a notification; returns the store-assigned id.
    pub fn insert_notification(&mut self, notification: NewNotification) -> String {
        let id = Uuid::new_v4().to_string();
        self.ops.push(WriteOp::InsertNotification { id: id.clone(), notification });
        id
    }
}

impl Database {
    pub fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt> {
        self.with_conn_mut(|conn| {
            let ts = self.next_timestamp();
            let tx = conn.transaction()?;

            let mut changed = 0;
            let mut changes = BTreeSet::new();
            for op in &batch.ops {
                let n = apply(&tx, op, ts)?;
                if n > 0 {
                    changed += n;
                    record_change(&tx, op, &mut changes)?;
                }
            }

            tx.commit()?;
            debug!("Committed batch of {} ops ({} rows changed)", batch.ops.len(), changed);

            // Published under the connection lock so subscribers observe
            // changes in commit order.
            for change in changes {
                self.publish(change);
            }

            Ok(CommitReceipt {
                timestamp: millis_to_datetime(ts),
                changed,
            })
        })
    }
}

fn apply(tx: &Transaction<'_>, op: &WriteOp, ts: i64) -> Result<usize> {
    let n = match op {
        WriteOp::CreateChat { chat_id, participants } => {
            let created = tx.execute(
                "INSERT OR IGNORE INTO chats (id, created_at) VALUES (?1, ?2)",
                rusqlite::params![chat_id, ts],
            )?;
            if created == 0 {
                return Ok(0);
            }
            for (position, (user_id, profile)) in participants.iter().enumerate() {
                tx.execute(
                    "INSERT INTO chat_participants (chat_id, user_id, position, name, surname, role, unread_count)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                    rusqlite::params![
                        chat_id,
                        user_id,
                        position as i64,
                        profile.name,
                        profile.surname,
                        profile.role
                    ],
                )?;
            }
            created
        }

        WriteOp::InsertMessage { id, message } => {
            let (name, kind, reference) = match &message.attachment {
                Some(a) => (Some(&a.name), Some(&a.content_type), a.reference.as_ref()),
                None => (None, None, None),
            };
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, sender_name, text,
                                       attachment_name, attachment_type, attachment_ref, timestamp, read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
                rusqlite::params![
                    id,
                    message.chat_id,
                    message.sender_id,
                    message.sender_name,
                    message.text,
                    name,
                    kind,
                    reference,
                    ts
                ],
            )?
        }

        WriteOp::SetLastMessage { chat_id, message_id, text, sender_id } => tx.execute(
            "UPDATE chats SET last_message_id = ?2, last_message_text = ?3, last_message_sender_id = ?4,
                              last_message_timestamp = ?5, last_message_read = 0
             WHERE id = ?1",
            rusqlite::params![chat_id, message_id, text, sender_id, ts],
        )?,

        WriteOp::IncrementUnread { chat_id, user_id } => tx.execute(
            "UPDATE chat_participants SET unread_count = unread_count + 1
             WHERE chat_id = ?1 AND user_id = ?2",
            (chat_id, user_id),
        )?,

        WriteOp::ResetUnread { chat_id, user_id } => tx.execute(
            "UPDATE chat_participants SET unread_count = 0
             WHERE chat_id = ?1 AND user_id = ?2 AND unread_count != 0",
            (chat_id, user_id),
        )?,

        WriteOp::MarkMessagesRead { chat_id, message_ids } => {
            let mut stmt = tx.prepare_cached(
                "UPDATE messages SET read = 1 WHERE id = ?1 AND chat_id = ?2 AND read = 0",
            )?;
            let mut n = 0;
            for id in message_ids {
                n += stmt.execute((id, chat_id))?;
            }
            n
        }

        WriteOp::MarkLastMessageRead { chat_id, message_id } => tx.execute(
            "UPDATE chats SET last_message_read = 1
             WHERE id = ?1 AND last_message_id = ?2 AND last_message_read = 0",
            (chat_id, message_id),
        )?,

        WriteOp::InsertNotification { id, notification: n } => tx.execute(
            "INSERT INTO notifications (id, recipient_id, sender_id, sender_name, title, message, type, link, created_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
            rusqlite::params![
                id,
                n.recipient_id,
                n.sender_id,
                n.sender_name,
                n.title,
                n.message,
                n.kind.as_str(),
                n.link,
                ts
            ],
        )?,

        WriteOp::MarkNotificationRead { id, recipient_id } => tx.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2 AND read = 0",
            (id, recipient_id),
        )?,
    };
    Ok(n)
}

fn record_change(tx: &Transaction<'_>, op: &WriteOp, changes: &mut BTreeSet<Change>) -> Result<()> {
    let chat_change = |chat_id: &str| -> Result<Change> {
        Ok(Change::Chat {
            chat_id: chat_id.to_string(),
            participants: participant_ids(tx, chat_id)?,
        })
    };

    match op {
        WriteOp::CreateChat { chat_id, .. }
        | WriteOp::SetLastMessage { chat_id, .. }
        | WriteOp::IncrementUnread { chat_id, .. }
        | WriteOp::ResetUnread { chat_id, .. }
        | WriteOp::MarkLastMessageRead { chat_id, .. } => {
            changes.insert(chat_change(chat_id)?);
        }
        WriteOp::InsertMessage { message, .. } => {
            changes.insert(Change::Messages { chat_id: message.chat_id.clone() });
        }
        WriteOp::MarkMessagesRead { chat_id, .. } => {
            changes.insert(Change::Messages { chat_id: chat_id.clone() });
        }
        WriteOp::InsertNotification { notification, .. } => {
            changes.insert(Change::Notifications {
                recipient_id: notification.recipient_id.clone(),
            });
        }
        WriteOp::MarkNotificationRead { recipient_id, .. } => {
            changes.insert(Change::Notifications { recipient_id: recipient_id.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> ParticipantProfile {
        ParticipantProfile {
            name: name.into(),
            surname: "Test".into(),
            role: "nurse".into(),
        }
    }

    fn create_chat(db: &Database) {
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreateChat {
            chat_id: "a_b".into(),
            participants: [("a".into(), profile("Ana")), ("b".into(), profile("Ben"))],
        });
        db.commit(batch).unwrap();
    }

    fn message(text: &str) -> NewMessage {
        NewMessage {
            chat_id: "a_b".into(),
            sender_id: "a".into(),
            sender_name: "Ana Test".into(),
            text: text.into(),
            attachment: None,
        }
    }

    #[test]
    fn create_chat_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        create_chat(&db);

        let mut again = WriteBatch::new();
        again.push(WriteOp::CreateChat {
            chat_id: "a_b".into(),
            participants: [("a".into(), profile("Other")), ("b".into(), profile("Other"))],
        });
        let receipt = db.commit(again).unwrap();
        assert_eq!(receipt.changed, 0);

        let chat = db.get_chat("a_b").unwrap().unwrap().into_model().unwrap();
        assert_eq!(chat.participant_profiles["a"].name, "Ana");
        assert_eq!(chat.unread_for("a"), 0);
        assert_eq!(chat.unread_for("b"), 0);
        assert!(chat.last_message.is_none());
    }

    #[test]
    fn failing_op_rolls_back_whole_batch() {
        let db = Database::open_in_memory().unwrap();
        create_chat(&db);

        let mut batch = WriteBatch::new();
        batch.insert_message(message("lost"));
        // References a chat that does not exist: foreign key violation.
        batch.insert_message(NewMessage { chat_id: "missing".into(), ..message("boom") });
        assert!(db.commit(batch).is_err());

        assert!(db.get_messages("a_b", 50).unwrap().is_empty());
    }

    #[test]
    fn read_flags_never_revert_and_changes_are_published() {
        let db = Database::open_in_memory().unwrap();
        create_chat(&db);
        let mut rx = db.subscribe();

        let mut batch = WriteBatch::new();
        let id = batch.insert_message(message("hello"));
        batch.push(WriteOp::SetLastMessage {
            chat_id: "a_b".into(),
            message_id: id.clone(),
            text: "hello".into(),
            sender_id: "a".into(),
        });
        db.commit(batch).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            Change::Chat { chat_id: "a_b".into(), participants: vec!["a".into(), "b".into()] }
        );
        assert_eq!(rx.try_recv().unwrap(), Change::Messages { chat_id: "a_b".into() });

        let mut mark = WriteBatch::new();
        mark.push(WriteOp::MarkMessagesRead { chat_id: "a_b".into(), message_ids: vec![id.clone()] });
        assert_eq!(db.commit(mark.clone()).unwrap().changed, 1);
        // Second pass finds nothing to flip and publishes nothing.
        assert_eq!(db.commit(mark).unwrap().changed, 0);

        let rows = db.get_messages("a_b", 50).unwrap();
        assert!(rows[0].read);
    }

    #[test]
    fn unread_inbound_ignores_the_display_window() {
        let db = Database::open_in_memory().unwrap();
        create_chat(&db);

        let mut batch = WriteBatch::new();
        for i in 0..5 {
            batch.insert_message(message(&format!("from a {i}")));
        }
        batch.insert_message(NewMessage { sender_id: "b".into(), ..message("from b") });
        db.commit(batch).unwrap();

        let window = db.get_messages("a_b", 2).unwrap();
        assert_eq!(window.len(), 2);

        let unread = db.unread_inbound("a_b", "b").unwrap();
        assert_eq!(unread.len(), 5);
        assert!(unread.iter().all(|m| m.sender_id == "a" && !m.read));

        let (chat, unread) = db.read_state("a_b", "a").unwrap();
        assert!(chat.is_some());
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].text, "from b");
    }

    #[test]
    fn batch_shares_one_timestamp() {
        let db = Database::open_in_memory().unwrap();
        create_chat(&db);

        let mut batch = WriteBatch::new();
        let id = batch.insert_message(message("hello"));
        batch.push(WriteOp::SetLastMessage {
            chat_id: "a_b".into(),
            message_id: id,
            text: "hello".into(),
            sender_id: "a".into(),
        });
        let receipt = db.commit(batch).unwrap();

        let chat = db.get_chat("a_b").unwrap().unwrap().into_model().unwrap();
        let msg = db.get_messages("a_b", 1).unwrap().remove(0).into_model();
        assert_eq!(msg.timestamp, receipt.timestamp);
        assert_eq!(chat.last_message.unwrap().timestamp, receipt.timestamp);
    }
}
