use std::sync::Arc;

use tracing::{error, info};

use wardline_db::{Database, NewMessage, WriteBatch, WriteOp};
use wardline_types::models::{Attachment, Message};

use crate::error::{ChatError, Result};
use crate::{blocking, notifications};

/// How many of the newest messages a conversation view loads.
pub const MESSAGE_WINDOW: u32 = 200;

/// Text stored for an attachment sent without a caption.
pub fn attachment_placeholder(attachment: &Attachment) -> String {
    format!("📎 {}", attachment.name)
}

/// Decide the text a send will store, or reject it before the store is
/// touched. Blank text is only allowed alongside an attachment.
pub fn prepare_text(text: &str, attachment: Option<&Attachment>) -> Result<String> {
    let trimmed = text.trim();
    match (trimmed.is_empty(), attachment) {
        (false, _) => Ok(trimmed.to_string()),
        (true, Some(a)) => Ok(attachment_placeholder(a)),
        (true, None) => Err(ChatError::EmptyMessage),
    }
}

/// Append a message to a conversation.
///
/// One batch carries the message, the conversation summary, the receiver's
/// unread increment and the receiver's notification; either all of it lands
/// or none of it does.
pub async fn send(
    db: &Arc<Database>,
    chat_id: &str,
    sender_id: &str,
    text: &str,
    attachment: Option<Attachment>,
) -> Result<Message> {
    let text = prepare_text(text, attachment.as_ref())?;

    let key = chat_id.to_string();
    let record = blocking(db, move |db| db.get_chat(&key))
        .await
        .map_err(ChatError::SendFailed)?;
    let chat = record
        .and_then(|r| r.into_model())
        .ok_or_else(|| ChatError::ConversationNotFound(chat_id.to_string()))?;

    let Some(recipient_id) = chat.other_participant(sender_id).map(str::to_string) else {
        return Err(ChatError::NotParticipant {
            chat_id: chat_id.to_string(),
            user_id: sender_id.to_string(),
        });
    };
    let sender_name = chat
        .participant_profiles
        .get(sender_id)
        .map(|p| p.display_name())
        .unwrap_or_default();

    let mut batch = WriteBatch::new();
    let message_id = batch.insert_message(NewMessage {
        chat_id: chat.id.clone(),
        sender_id: sender_id.to_string(),
        sender_name: sender_name.clone(),
        text: text.clone(),
        attachment: attachment.clone(),
    });
    batch
        .push(WriteOp::SetLastMessage {
            chat_id: chat.id.clone(),
            message_id: message_id.clone(),
            text: text.clone(),
            sender_id: sender_id.to_string(),
        })
        .push(WriteOp::IncrementUnread {
            chat_id: chat.id.clone(),
            user_id: recipient_id.clone(),
        });
    batch.insert_notification(notifications::message_notification(
        &recipient_id,
        sender_id,
        &sender_name,
        &text,
        &chat.id,
    ));

    let receipt = blocking(db, move |db| db.commit(batch)).await.map_err(|e| {
        error!("Send into {} failed: {:#}", chat_id, e);
        ChatError::SendFailed(e)
    })?;

    info!("{} sent message {} into {}", sender_id, message_id, chat.id);

    Ok(Message {
        id: message_id,
        chat_id: chat.id,
        sender_id: sender_id.to_string(),
        sender_name,
        text,
        attachment,
        timestamp: receipt.timestamp,
        read: false,
    })
}

/// The newest `limit` messages of a conversation, oldest first.
pub async fn messages(db: &Arc<Database>, chat_id: &str, limit: u32) -> Result<Vec<Message>> {
    let key = chat_id.to_string();
    let rows = blocking(db, move |db| db.get_messages(&key, limit)).await?;
    Ok(rows.into_iter().map(|r| r.into_model()).collect())
}
