use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role name granting administrative privileges.
pub const ADMIN_ROLE: &str = "admin";

/// Staff profile as owned by the authentication side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub id: String,
    pub name: String,
    pub surname: String,
    pub role: String,
}

impl StaffProfile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname).trim().to_string()
    }
}

/// Participant snapshot stored inline on a conversation.
/// Captured when the conversation is created and never re-synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub name: String,
    pub surname: String,
    pub role: String,
}

impl ParticipantProfile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname).trim().to_string()
    }
}

impl From<&StaffProfile> for ParticipantProfile {
    fn from(p: &StaffProfile) -> Self {
        Self {
            name: p.name.clone(),
            surname: p.surname.clone(),
            role: p.role.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// Always in key order: the lexicographically smaller id first.
    pub participants: [String; 2],
    pub participant_profiles: HashMap<String, ParticipantProfile>,
    pub last_message: Option<LastMessage>,
    pub unread_counts: HashMap<String, u32>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The participant that is not `user_id`, if `user_id` takes part at all.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread_counts.get(user_id).copied().unwrap_or(0)
    }
}

/// File descriptor attached to a message. Uploads are not performed; the
/// reference is a placeholder until a storage backend exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub attachment: Option<Attachment>,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    PasswordChange,
    #[serde(other)]
    General,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::PasswordChange => "password_change",
            Self::General => "general",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "message" => Self::Message,
            "password_change" => Self::PasswordChange,
            _ => Self::General,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
