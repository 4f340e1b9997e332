//! Live snapshot subscriptions over the store's change feed.
//!
//! A [`Subscription`] emits a full snapshot when acquired and again after
//! every relevant committed change, in order, to a single consumer.
//! Dropping the handle releases it: the forwarding task is aborted.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use wardline_db::{Change, Database};
use wardline_types::api::ConversationSummary;
use wardline_types::models::{Conversation, Message, Notification};

use crate::projector;

/// Snapshots buffered per subscription before the forwarder waits on the
/// consumer.
const SNAPSHOT_BUFFER: usize = 16;

pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Next snapshot. `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn<T, R, L>(db: &Arc<Database>, relevant: R, load: L) -> Subscription<T>
where
    T: Send + 'static,
    R: Fn(&Change) -> bool + Send + 'static,
    L: Fn(&Database) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
    let db = db.clone();
    let load = Arc::new(load);

    let task = tokio::spawn(async move {
        // Subscribe before the first load so no change slips between them.
        let mut changes = db.subscribe();

        loop {
            let db_load = db.clone();
            let load = load.clone();
            match tokio::task::spawn_blocking(move || load(db_load.as_ref())).await {
                Ok(Ok(snapshot)) => {
                    if tx.send(snapshot).await.is_err() {
                        return;
                    }
                }
                Ok(Err(e)) => warn!("Subscription snapshot failed: {:#}", e),
                Err(e) => warn!("spawn_blocking join error: {}", e),
            }

            // Wait for a relevant change.
            loop {
                match changes.recv().await {
                    Ok(change) if relevant(&change) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Subscription lagged by {} changes, reloading", n);
                        break;
                    }
                    Err(RecvError::Closed) => return,
                }
            }

            // Changes already queued are covered by the reload.
            loop {
                match changes.try_recv() {
                    Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Closed) => return,
                }
            }
        }
    });

    Subscription { rx, task }
}

/// The viewer's projected conversation list.
pub fn chat_list(db: &Arc<Database>, viewer: &str) -> Subscription<Vec<ConversationSummary>> {
    let watch = viewer.to_string();
    let viewer = viewer.to_string();
    spawn(
        db,
        move |change| matches!(change, Change::Chat { participants, .. } if participants.contains(&watch)),
        move |db| {
            let conversations = db
                .chats_for_user(&viewer)?
                .into_iter()
                .filter_map(|r| r.into_model())
                .collect();
            Ok(projector::project(&viewer, conversations))
        },
    )
}

/// One conversation record; `None` while it does not exist.
pub fn conversation(db: &Arc<Database>, chat_id: &str) -> Subscription<Option<Conversation>> {
    let watch = chat_id.to_string();
    let chat_id = chat_id.to_string();
    spawn(
        db,
        move |change| matches!(change, Change::Chat { chat_id, .. } if *chat_id == watch),
        move |db| Ok(db.get_chat(&chat_id)?.and_then(|r| r.into_model())),
    )
}

/// The newest `limit` messages of a conversation, oldest first.
pub fn messages(db: &Arc<Database>, chat_id: &str, limit: u32) -> Subscription<Vec<Message>> {
    let watch = chat_id.to_string();
    let chat_id = chat_id.to_string();
    spawn(
        db,
        move |change| matches!(change, Change::Messages { chat_id } if *chat_id == watch),
        move |db| {
            Ok(db
                .get_messages(&chat_id, limit)?
                .into_iter()
                .map(|r| r.into_model())
                .collect())
        },
    )
}

/// The recipient's newest `limit` notifications.
pub fn notifications(db: &Arc<Database>, recipient_id: &str, limit: u32) -> Subscription<Vec<Notification>> {
    let watch = recipient_id.to_string();
    let recipient_id = recipient_id.to_string();
    spawn(
        db,
        move |change| matches!(change, Change::Notifications { recipient_id } if *recipient_id == watch),
        move |db| {
            Ok(db
                .get_notifications(&recipient_id, limit)?
                .into_iter()
                .map(|r| r.into_model())
                .collect())
        },
    )
}
