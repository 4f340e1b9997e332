//! Database row types. These map directly to SQLite rows and convert into
//! the shared `wardline-types` models at the edge of this crate.

use std::collections::HashMap;

use wardline_types::models::{
    Attachment, Conversation, LastMessage, Message, Notification, NotificationKind,
    ParticipantProfile, StaffProfile,
};

use crate::millis_to_datetime;

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub surname: String,
    pub role: String,
}

impl UserRow {
    pub fn into_model(self) -> StaffProfile {
        StaffProfile {
            id: self.id,
            name: self.name,
            surname: self.surname,
            role: self.role,
        }
    }
}

pub struct ChatRow {
    pub id: String,
    pub created_at: i64,
    pub last_message_id: Option<String>,
    pub last_message_text: Option<String>,
    pub last_message_sender_id: Option<String>,
    pub last_message_timestamp: Option<i64>,
    pub last_message_read: Option<bool>,
}

pub struct ParticipantRow {
    pub chat_id: String,
    pub user_id: String,
    pub position: i64,
    pub name: String,
    pub surname: String,
    pub role: String,
    pub unread_count: i64,
}

/// A conversation row together with its two participant rows.
pub struct ChatRecord {
    pub chat: ChatRow,
    pub participants: Vec<ParticipantRow>,
}

impl ChatRecord {
    /// Returns `None` for a record that does not have exactly two
    /// participants, which only a half-applied external edit could produce.
    pub fn into_model(self) -> Option<Conversation> {
        let ChatRecord { chat, mut participants } = self;
        if participants.len() != 2 {
            return None;
        }
        participants.sort_by_key(|p| p.position);

        let last_message = match (
            chat.last_message_id,
            chat.last_message_text,
            chat.last_message_sender_id,
            chat.last_message_timestamp,
        ) {
            (Some(id), Some(text), Some(sender_id), Some(ts)) => Some(LastMessage {
                id,
                text,
                sender_id,
                timestamp: millis_to_datetime(ts),
                read: chat.last_message_read.unwrap_or(false),
            }),
            _ => None,
        };

        let unread_counts: HashMap<String, u32> = participants
            .iter()
            .map(|p| (p.user_id.clone(), p.unread_count.max(0) as u32))
            .collect();

        let mut ids = participants.iter().map(|p| p.user_id.clone());
        let participant_pair = [ids.next()?, ids.next()?];

        let participant_profiles = participants
            .into_iter()
            .map(|p| {
                (
                    p.user_id,
                    ParticipantProfile {
                        name: p.name,
                        surname: p.surname,
                        role: p.role,
                    },
                )
            })
            .collect();

        Some(Conversation {
            id: chat.id,
            participants: participant_pair,
            participant_profiles,
            last_message,
            unread_counts,
            created_at: millis_to_datetime(chat.created_at),
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub attachment_name: Option<String>,
    pub attachment_type: Option<String>,
    pub attachment_ref: Option<String>,
    pub timestamp: i64,
    pub read: bool,
}

impl MessageRow {
    pub fn into_model(self) -> Message {
        let attachment = self.attachment_name.map(|name| Attachment {
            name,
            content_type: self.attachment_type.unwrap_or_default(),
            reference: self.attachment_ref,
        });

        Message {
            id: self.id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            text: self.text,
            attachment,
            timestamp: millis_to_datetime(self.timestamp),
            read: self.read,
        }
    }
}

pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub link: Option<String>,
    pub created_at: i64,
    pub read: bool,
}

impl NotificationRow {
    pub fn into_model(self) -> Notification {
        Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            title: self.title,
            message: self.message,
            kind: NotificationKind::parse(&self.kind),
            link: self.link,
            created_at: millis_to_datetime(self.created_at),
            read: self.read,
        }
    }
}
