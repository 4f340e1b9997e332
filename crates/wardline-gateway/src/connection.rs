use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use wardline_db::Database;
use wardline_types::api::Claims;
use wardline_types::events::{GatewayCommand, GatewayEvent};

use crate::session::Session;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Events queued for one client before producers wait on the socket.
const OUTBOUND_BUFFER: usize = 256;

/// Handle a WebSocket whose bearer token was already validated at the HTTP
/// upgrade.
pub async fn handle_connection(socket: WebSocket, db: Arc<Database>, claims: Claims) {
    let (mut sender, mut receiver) = socket.split();
    let user_id = claims.sub.clone();

    info!("{} ({}) connected to gateway", claims.name, user_id);

    let ready = GatewayEvent::Ready { user_id: user_id.clone() };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<GatewayEvent>(OUTBOUND_BUFFER);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward session events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = out_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client. The session, and every subscription it
    // holds, lives exactly as long as this task.
    let recv_user = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut session = Session::start(db, recv_user.clone(), out_tx);

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => session.handle(cmd).await,
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} bad command: {} -- raw: {}", recv_user, e, raw);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", claims.name, user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
