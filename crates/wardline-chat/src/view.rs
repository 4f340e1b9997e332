use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use wardline_db::Database;
use wardline_types::models::{Conversation, Message};

use crate::error::Result;
use crate::subscription::{self, Subscription};
use crate::{reconciler, repository, stream};

/// Snapshots a view forwards to whoever renders it.
#[derive(Debug, Clone)]
pub enum ViewEvent {
    Conversation(Option<Conversation>),
    Messages(Vec<Message>),
}

/// A conversation being looked at by `viewer`.
///
/// Owns the two live subscriptions of the conversation and reconciles read
/// state after every snapshot. At most one reconciliation pass is in flight;
/// snapshots arriving meanwhile only mark the view for one follow-up pass.
pub struct ConversationView {
    db: Arc<Database>,
    chat_id: String,
    viewer: String,
    conversation: Subscription<Option<Conversation>>,
    messages: Subscription<Vec<Message>>,
    in_progress: bool,
    rerun: bool,
    passes_tx: mpsc::Sender<Result<usize>>,
    passes_rx: mpsc::Receiver<Result<usize>>,
}

impl ConversationView {
    /// Start viewing: checks membership, zeroes the viewer's unread counter
    /// and acquires the subscriptions.
    pub async fn open(db: &Arc<Database>, chat_id: &str, viewer: &str) -> Result<Self> {
        repository::get_for_participant(db, chat_id, viewer).await?;
        reconciler::reset_unread(db, chat_id, viewer).await?;

        info!("{} opened conversation {}", viewer, chat_id);

        let (passes_tx, passes_rx) = mpsc::channel(1);
        Ok(Self {
            db: db.clone(),
            chat_id: chat_id.to_string(),
            viewer: viewer.to_string(),
            conversation: subscription::conversation(db, chat_id),
            messages: subscription::messages(db, chat_id, stream::MESSAGE_WINDOW),
            in_progress: false,
            rerun: false,
            passes_tx,
            passes_rx,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Drive the view until either subscription ends or `out` is closed.
    /// Dropping the future releases both subscriptions; a pass already
    /// committing still runs to completion.
    pub async fn run(mut self, out: mpsc::Sender<ViewEvent>) {
        loop {
            tokio::select! {
                snapshot = self.conversation.next() => {
                    let Some(chat) = snapshot else { break };
                    if out.send(ViewEvent::Conversation(chat)).await.is_err() {
                        break;
                    }
                    self.trigger();
                }
                snapshot = self.messages.next() => {
                    let Some(messages) = snapshot else { break };
                    if out.send(ViewEvent::Messages(messages)).await.is_err() {
                        break;
                    }
                    self.trigger();
                }
                Some(outcome) = self.passes_rx.recv() => {
                    self.finish_pass(outcome);
                }
            }
        }
        debug!("{} closed conversation {}", self.viewer, self.chat_id);
    }

    fn trigger(&mut self) {
        if self.in_progress {
            self.rerun = true;
            return;
        }

        // The pass reads the whole conversation from the store; snapshots
        // only tell it when to look.
        self.in_progress = true;
        let db = self.db.clone();
        let chat_id = self.chat_id.clone();
        let viewer = self.viewer.clone();
        let done = self.passes_tx.clone();
        tokio::spawn(async move {
            let outcome = reconciler::reconcile(&db, &chat_id, &viewer).await;
            let _ = done.send(outcome).await;
        });
    }

    fn finish_pass(&mut self, outcome: Result<usize>) {
        self.in_progress = false;
        match outcome {
            Ok(changed) => debug!("Marked {} records read in {}", changed, self.chat_id),
            // Retried on the next trigger.
            Err(e) => warn!("Read-state pass for {} failed: {}", self.chat_id, e),
        }
        if std::mem::take(&mut self.rerun) {
            self.trigger();
        }
    }
}
