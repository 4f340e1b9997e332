use serde::{Deserialize, Serialize};

use crate::api::ConversationSummary;
use crate::models::{Attachment, Conversation, Message, Notification};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the authenticated connection
    Ready { user_id: String },

    /// Fresh snapshot of the viewer's conversation list
    ChatList { chats: Vec<ConversationSummary> },

    /// Fresh snapshot of the open conversation record
    Conversation { chat: Option<Conversation> },

    /// Fresh snapshot of the open conversation's messages, oldest first
    Messages { chat_id: String, messages: Vec<Message> },

    /// Fresh snapshot of the viewer's notifications, newest first
    Notifications { notifications: Vec<Notification> },

    /// Reply to StartChat
    ChatStarted { chat_id: String },

    /// Reply to SendMessage
    MessageSent { message: Message },

    /// A command failed
    Error { kind: String, message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start viewing a conversation. Replaces any open one.
    OpenChat { chat_id: String },

    /// Stop viewing the open conversation
    CloseChat,

    /// Resolve or create the conversation with another staff member
    StartChat { other_id: String },

    /// Send a message into a conversation
    SendMessage {
        chat_id: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        attachment: Option<Attachment>,
    },
}
