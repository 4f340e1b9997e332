use std::sync::Arc;

use tracing::{debug, info};

use wardline_db::{Database, WriteBatch, WriteOp};
use wardline_types::models::{Conversation, ParticipantProfile};

use crate::error::{ChatError, Result};
use crate::{blocking, identity};

enum Resolution {
    Existing,
    Created,
    MissingProfile(String),
}

/// Resolve the conversation between two staff members, creating it on first
/// contact. Returns the conversation key either way.
///
/// Two callers racing on the same pair both end up with the same key and a
/// single record: creation is create-if-absent on the deterministic key.
pub async fn get_or_create(db: &Arc<Database>, self_id: &str, other_id: &str) -> Result<String> {
    // An id holding the separator would let two different pairs share a key.
    if self_id == other_id || self_id.contains(identity::SEPARATOR) || other_id.contains(identity::SEPARATOR) {
        return Err(ChatError::InvalidParticipants);
    }

    let chat_id = identity::chat_id(self_id, other_id);
    let (first, second) = identity::ordered(self_id, other_id);
    let (first, second) = (first.to_string(), second.to_string());

    let key = chat_id.clone();
    let resolution = blocking(db, move |db| {
        if db.chat_exists(&key)? {
            return Ok(Resolution::Existing);
        }

        let Some(first_profile) = db.get_user(&first)? else {
            return Ok(Resolution::MissingProfile(first));
        };
        let Some(second_profile) = db.get_user(&second)? else {
            return Ok(Resolution::MissingProfile(second));
        };

        let first_profile = first_profile.into_model();
        let second_profile = second_profile.into_model();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreateChat {
            chat_id: key,
            participants: [
                (first, ParticipantProfile::from(&first_profile)),
                (second, ParticipantProfile::from(&second_profile)),
            ],
        });
        db.commit(batch)?;
        Ok(Resolution::Created)
    })
    .await?;

    match resolution {
        Resolution::Existing => {
            debug!("Resolved existing conversation {}", chat_id);
            Ok(chat_id)
        }
        Resolution::Created => {
            info!("Created conversation {}", chat_id);
            Ok(chat_id)
        }
        Resolution::MissingProfile(user_id) => Err(ChatError::NotFound(format!("staff profile {user_id}"))),
    }
}

/// Current conversation record.
pub async fn get(db: &Arc<Database>, chat_id: &str) -> Result<Conversation> {
    let key = chat_id.to_string();
    let record = blocking(db, move |db| db.get_chat(&key)).await?;
    record
        .and_then(|r| r.into_model())
        .ok_or_else(|| ChatError::ConversationNotFound(chat_id.to_string()))
}

/// Current conversation record, checked for `user_id` taking part in it.
pub async fn get_for_participant(db: &Arc<Database>, chat_id: &str, user_id: &str) -> Result<Conversation> {
    let chat = get(db, chat_id).await?;
    if !chat.has_participant(user_id) {
        return Err(ChatError::NotParticipant {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
        });
    }
    Ok(chat)
}
