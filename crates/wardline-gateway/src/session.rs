use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use wardline_chat::view::{ConversationView, ViewEvent};
use wardline_chat::{ChatError, repository, stream, subscription};
use wardline_db::Database;
use wardline_types::events::{GatewayCommand, GatewayEvent};

/// Notifications kept in the live notification feed.
const NOTIFICATION_FEED_LIMIT: u32 = 20;

/// A spawned forwarder, aborted when dropped.
struct Feed(JoinHandle<()>);

impl Drop for Feed {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct OpenView {
    chat_id: String,
    _feed: Feed,
}

/// Per-connection state of one signed-in user: the always-on list and
/// notification feeds plus at most one open conversation. Everything it
/// produces goes to `out`; dropping the session releases every subscription.
pub struct Session {
    db: Arc<Database>,
    user_id: String,
    out: mpsc::Sender<GatewayEvent>,
    open: Option<OpenView>,
    _feeds: Vec<Feed>,
}

impl Session {
    pub fn start(db: Arc<Database>, user_id: String, out: mpsc::Sender<GatewayEvent>) -> Self {
        let mut chats = subscription::chat_list(&db, &user_id);
        let chats_out = out.clone();
        let chat_feed = Feed(tokio::spawn(async move {
            while let Some(chats) = chats.next().await {
                if chats_out.send(GatewayEvent::ChatList { chats }).await.is_err() {
                    break;
                }
            }
        }));

        let mut inbox = subscription::notifications(&db, &user_id, NOTIFICATION_FEED_LIMIT);
        let inbox_out = out.clone();
        let inbox_feed = Feed(tokio::spawn(async move {
            while let Some(notifications) = inbox.next().await {
                if inbox_out.send(GatewayEvent::Notifications { notifications }).await.is_err() {
                    break;
                }
            }
        }));

        Self {
            db,
            user_id,
            out,
            open: None,
            _feeds: vec![chat_feed, inbox_feed],
        }
    }

    pub fn open_chat_id(&self) -> Option<&str> {
        self.open.as_ref().map(|v| v.chat_id.as_str())
    }

    pub async fn handle(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::OpenChat { chat_id } => {
                // Release the previous view before acquiring the next one.
                self.open = None;
                match ConversationView::open(&self.db, &chat_id, &self.user_id).await {
                    Ok(view) => {
                        let feed = Feed(tokio::spawn(forward_view(view, self.out.clone())));
                        self.open = Some(OpenView { chat_id, _feed: feed });
                    }
                    Err(e) => self.report(e).await,
                }
            }

            GatewayCommand::CloseChat => {
                if let Some(view) = self.open.take() {
                    info!("{} closed conversation {}", self.user_id, view.chat_id);
                }
            }

            GatewayCommand::StartChat { other_id } => {
                match repository::get_or_create(&self.db, &self.user_id, &other_id).await {
                    Ok(chat_id) => self.emit(GatewayEvent::ChatStarted { chat_id }).await,
                    Err(e) => self.report(e).await,
                }
            }

            GatewayCommand::SendMessage { chat_id, text, attachment } => {
                match stream::send(&self.db, &chat_id, &self.user_id, &text, attachment).await {
                    Ok(message) => self.emit(GatewayEvent::MessageSent { message }).await,
                    Err(e) => self.report(e).await,
                }
            }
        }
    }

    async fn emit(&self, event: GatewayEvent) {
        let _ = self.out.send(event).await;
    }

    async fn report(&self, e: ChatError) {
        warn!("{} command failed: {}", self.user_id, e);
        self.emit(GatewayEvent::Error {
            kind: e.kind().to_string(),
            message: e.to_string(),
        })
        .await;
    }
}

async fn forward_view(view: ConversationView, out: mpsc::Sender<GatewayEvent>) {
    let chat_id = view.chat_id().to_string();
    let (tx, mut rx) = mpsc::channel(16);

    let forward = async move {
        while let Some(event) = rx.recv().await {
            let event = match event {
                ViewEvent::Conversation(chat) => GatewayEvent::Conversation { chat },
                ViewEvent::Messages(messages) => GatewayEvent::Messages {
                    chat_id: chat_id.clone(),
                    messages,
                },
            };
            if out.send(event).await.is_err() {
                break;
            }
        }
    };

    // Each side ends the other by dropping its half of the channel.
    tokio::join!(view.run(tx), forward);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wardline_types::models::StaffProfile;

    fn seeded_db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        for (id, name) in [("u1", "Alice"), ("u2", "Bob"), ("u3", "Cara")] {
            db.put_user(&StaffProfile {
                id: id.into(),
                name: name.into(),
                surname: "Test".into(),
                role: "nurse".into(),
            })
            .unwrap();
        }
        Arc::new(db)
    }

    async fn wait_for<F>(rx: &mut mpsc::Receiver<GatewayEvent>, mut matches: F) -> GatewayEvent
    where
        F: FnMut(&GatewayEvent) -> bool,
    {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("no matching event")
                .expect("session closed");
            if matches(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn start_send_and_receive() {
        let db = seeded_db();
        let (a_tx, mut a_rx) = mpsc::channel(64);
        let (b_tx, mut b_rx) = mpsc::channel(64);
        let mut alice = Session::start(db.clone(), "u1".into(), a_tx);
        let mut bob = Session::start(db.clone(), "u2".into(), b_tx);

        alice.handle(GatewayCommand::StartChat { other_id: "u2".into() }).await;
        let started = wait_for(&mut a_rx, |e| matches!(e, GatewayEvent::ChatStarted { .. })).await;
        let GatewayEvent::ChatStarted { chat_id } = started else { unreachable!() };
        assert_eq!(chat_id, "u1_u2");

        alice
            .handle(GatewayCommand::SendMessage { chat_id: chat_id.clone(), text: "Hello".into(), attachment: None })
            .await;
        wait_for(&mut a_rx, |e| matches!(e, GatewayEvent::MessageSent { .. })).await;

        wait_for(&mut b_rx, |e| matches!(e, GatewayEvent::ChatList { chats } if chats.first().is_some_and(|c| c.unread == 1)))
            .await;
        wait_for(&mut b_rx, |e| matches!(e, GatewayEvent::Notifications { notifications } if notifications.len() == 1))
            .await;

        bob.handle(GatewayCommand::OpenChat { chat_id: chat_id.clone() }).await;
        assert_eq!(bob.open_chat_id(), Some("u1_u2"));
        wait_for(&mut b_rx, |e| matches!(e, GatewayEvent::ChatList { chats } if chats.first().is_some_and(|c| c.unread == 0)))
            .await;
        wait_for(&mut b_rx, |e| {
            matches!(e, GatewayEvent::Messages { messages, .. } if messages.len() == 1 && messages[0].read)
        })
        .await;

        bob.handle(GatewayCommand::CloseChat).await;
        assert_eq!(bob.open_chat_id(), None);
    }

    #[tokio::test]
    async fn failures_become_error_events() {
        let db = seeded_db();
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = Session::start(db, "u1".into(), tx);

        session.handle(GatewayCommand::OpenChat { chat_id: "u2_u3".into() }).await;
        let event = wait_for(&mut rx, |e| matches!(e, GatewayEvent::Error { .. })).await;
        assert!(matches!(event, GatewayEvent::Error { kind, .. } if kind == "conversation_not_found"));
        assert_eq!(session.open_chat_id(), None);

        session
            .handle(GatewayCommand::SendMessage { chat_id: "u1_u2".into(), text: " ".into(), attachment: None })
            .await;
        let event = wait_for(&mut rx, |e| matches!(e, GatewayEvent::Error { .. })).await;
        assert!(matches!(event, GatewayEvent::Error { kind, .. } if kind == "empty_message"));
    }
}
