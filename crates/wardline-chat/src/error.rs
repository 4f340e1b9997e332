use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conversation {0} not found")]
    ConversationNotFound(String),
    #[error("message could not be sent")]
    SendFailed(#[source] anyhow::Error),
    #[error("authentication required")]
    AuthRequired,
    #[error("message text is empty")]
    EmptyMessage,
    #[error("a conversation needs two distinct participants")]
    InvalidParticipants,
    #[error("{user_id} is not a participant of {chat_id}")]
    NotParticipant { chat_id: String, user_id: String },
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ChatError {
    /// Stable machine-readable tag, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ConversationNotFound(_) => "conversation_not_found",
            Self::SendFailed(_) => "send_failed",
            Self::AuthRequired => "auth_required",
            Self::EmptyMessage => "empty_message",
            Self::InvalidParticipants => "invalid_participants",
            Self::NotParticipant { .. } => "not_participant",
            Self::Store(_) => "store",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
