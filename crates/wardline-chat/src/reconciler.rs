//! Read-state reconciliation for the conversation a viewer has open.
//!
//! [`plan`] is pure: it looks at the conversation record and the unread
//! inbound messages and decides which writes, if any, settle them.
//! [`reconcile`] feeds it from one store read covering the whole
//! conversation, not only the display window. The live driver that decides
//! *when* to run it, and keeps passes from overlapping, is
//! [`crate::view::ConversationView`].

use std::sync::Arc;

use tracing::debug;

use wardline_db::{Database, WriteBatch, WriteOp};
use wardline_types::models::{Conversation, Message};

use crate::error::Result;
use crate::{blocking, repository};

/// Inbound messages the viewer has not read yet.
pub fn select_unread<'a>(viewer: &str, messages: &'a [Message]) -> Vec<&'a Message> {
    messages.iter().filter(|m| !m.read && m.sender_id != viewer).collect()
}

/// The batch that brings the viewer's read state up to date, or `None`
/// when it is already settled.
///
/// Besides marking every selected message, the batch flips the summary's
/// `lastMessage` when it is inbound and still unread, and zeroes the
/// viewer's unread counter when messages arrived while the conversation was
/// open. The summary flip also covers a `lastMessage` whose message was
/// already marked by an earlier pass.
pub fn plan(viewer: &str, chat: Option<&Conversation>, messages: &[Message]) -> Option<WriteBatch> {
    let selected = select_unread(viewer, messages);

    let stale_last = chat.and_then(|c| {
        let last = c.last_message.as_ref()?;
        (!last.read && last.sender_id != viewer).then(|| (c.id.clone(), last.id.clone()))
    });
    let stale_counter = chat.filter(|c| c.unread_for(viewer) > 0).map(|c| c.id.clone());

    if selected.is_empty() && stale_last.is_none() && stale_counter.is_none() {
        return None;
    }

    let mut batch = WriteBatch::new();
    if let Some(first) = selected.first() {
        batch.push(WriteOp::MarkMessagesRead {
            chat_id: first.chat_id.clone(),
            message_ids: selected.iter().map(|m| m.id.clone()).collect(),
        });
    }
    if let Some((chat_id, message_id)) = stale_last {
        batch.push(WriteOp::MarkLastMessageRead { chat_id, message_id });
    }
    if let Some(chat_id) = stale_counter {
        batch.push(WriteOp::ResetUnread {
            chat_id,
            user_id: viewer.to_string(),
        });
    }
    Some(batch)
}

/// Commit a planned batch. Returns the number of records changed.
pub async fn commit(db: &Arc<Database>, batch: WriteBatch) -> Result<usize> {
    let receipt = blocking(db, move |db| db.commit(batch)).await?;
    Ok(receipt.changed)
}

/// Zero the viewer's unread counter. Done once when a conversation is
/// opened, separately from message-level marking.
pub async fn reset_unread(db: &Arc<Database>, chat_id: &str, viewer: &str) -> Result<()> {
    let mut batch = WriteBatch::new();
    batch.push(WriteOp::ResetUnread {
        chat_id: chat_id.to_string(),
        user_id: viewer.to_string(),
    });
    let changed = commit(db, batch).await?;
    if changed > 0 {
        debug!("Reset unread counter of {} in {}", viewer, chat_id);
    }
    Ok(())
}

/// One reconciliation pass against the current store state. Returns how
/// many records were changed.
pub async fn reconcile(db: &Arc<Database>, chat_id: &str, viewer: &str) -> Result<usize> {
    let (key, who) = (chat_id.to_string(), viewer.to_string());
    let (chat, unread) = blocking(db, move |db| db.read_state(&key, &who)).await?;

    let chat = chat.and_then(|r| r.into_model());
    let unread: Vec<Message> = unread.into_iter().map(|r| r.into_model()).collect();
    match plan(viewer, chat.as_ref(), &unread) {
        Some(batch) => commit(db, batch).await,
        None => Ok(0),
    }
}

/// One-shot form for callers without a live view: reset the counter and
/// run a single pass. Returns how many records were marked.
pub async fn open_and_reconcile(db: &Arc<Database>, chat_id: &str, viewer: &str) -> Result<usize> {
    repository::get_for_participant(db, chat_id, viewer).await?;
    reset_unread(db, chat_id, viewer).await?;
    reconcile(db, chat_id, viewer).await
}
