use serde::{Deserialize, Serialize};

use crate::models::{Attachment, LastMessage, ParticipantProfile, StaffProfile};

// -- JWT Claims --

/// Bearer token claims issued by the authentication service. Shared by the
/// REST middleware and the gateway upgrade check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub surname: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn profile(&self) -> StaffProfile {
        StaffProfile {
            id: self.sub.clone(),
            name: self.name.clone(),
            surname: self.surname.clone(),
            role: self.role.clone(),
        }
    }
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartChatRequest {
    pub other_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChatResponse {
    pub chat_id: String,
}

/// One row of the viewer's conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub chat_id: String,
    pub other_id: String,
    pub other_profile: Option<ParticipantProfile>,
    pub last_message: Option<LastMessage>,
    pub unread: u32,
    /// Display form of `unread`; `None` when there is nothing unread.
    pub badge: Option<String>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatResponse {
    pub chat_id: String,
    pub marked_read: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
