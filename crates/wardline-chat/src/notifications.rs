use std::sync::Arc;

use tracing::info;

use wardline_db::{Database, NewNotification, WriteBatch, WriteOp};
use wardline_types::models::{ADMIN_ROLE, Notification, NotificationKind, StaffProfile};

use crate::blocking;
use crate::error::{ChatError, Result};

/// Notification bodies are cut to this many characters.
pub const MAX_BODY_CHARS: usize = 100;

pub fn truncate_body(text: &str) -> String {
    text.chars().take(MAX_BODY_CHARS).collect()
}

pub fn chat_link(chat_id: &str) -> String {
    format!("/messages/{chat_id}")
}

/// The notification a message send emits for its recipient. Committed in
/// the same batch as the message itself.
pub fn message_notification(
    recipient_id: &str,
    sender_id: &str,
    sender_name: &str,
    text: &str,
    chat_id: &str,
) -> NewNotification {
    NewNotification {
        recipient_id: recipient_id.to_string(),
        sender_id: sender_id.to_string(),
        sender_name: sender_name.to_string(),
        title: format!("New message from {sender_name}"),
        message: truncate_body(text),
        kind: NotificationKind::Message,
        link: Some(chat_link(chat_id)),
    }
}

/// Commit a single standalone notification. Returns its id.
pub async fn dispatch(db: &Arc<Database>, mut notification: NewNotification) -> Result<String> {
    notification.message = truncate_body(&notification.message);
    let id = blocking(db, move |db| {
        let mut batch = WriteBatch::new();
        let id = batch.insert_notification(notification);
        db.commit(batch)?;
        Ok(id)
    })
    .await?;
    Ok(id)
}

/// Tell every administrator that `actor` changed their password: one
/// notification per admin account, all in one batch. Returns how many were
/// created.
pub async fn password_changed(db: &Arc<Database>, actor: &StaffProfile) -> Result<usize> {
    let actor_id = actor.id.clone();
    let actor = actor.clone();
    let created = blocking(db, move |db| {
        let admins = db.users_with_role(ADMIN_ROLE)?;

        let sender_name = actor.display_name();
        let mut batch = WriteBatch::new();
        for admin in admins.iter().filter(|a| a.id != actor.id) {
            batch.insert_notification(NewNotification {
                recipient_id: admin.id.clone(),
                sender_id: actor.id.clone(),
                sender_name: sender_name.clone(),
                title: "Password changed".to_string(),
                message: truncate_body(&format!("{sender_name} ({}) changed their password", actor.role)),
                kind: NotificationKind::PasswordChange,
                link: None,
            });
        }

        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();
        db.commit(batch)?;
        Ok(count)
    })
    .await?;

    info!("Password change by {} fanned out to {} admins", actor_id, created);
    Ok(created)
}

pub async fn list(db: &Arc<Database>, recipient_id: &str, limit: u32) -> Result<Vec<Notification>> {
    let recipient = recipient_id.to_string();
    let rows = blocking(db, move |db| db.get_notifications(&recipient, limit)).await?;
    Ok(rows.into_iter().map(|r| r.into_model()).collect())
}

/// Mark one of `recipient_id`'s notifications read. The only mutation a
/// notification ever sees.
pub async fn mark_read(db: &Arc<Database>, id: &str, recipient_id: &str) -> Result<Notification> {
    let (id, recipient) = (id.to_string(), recipient_id.to_string());
    let row = blocking(db, move |db| {
        match db.get_notification(&id)? {
            Some(row) if row.recipient_id == recipient => {}
            _ => return Ok(None),
        }
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::MarkNotificationRead { id: id.clone(), recipient_id: recipient });
        db.commit(batch)?;
        db.get_notification(&id)
    })
    .await?;

    row.map(|r| r.into_model())
        .ok_or_else(|| ChatError::NotFound("notification".to_string()))
}
