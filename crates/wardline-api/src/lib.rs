pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod security;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use wardline_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
}

/// All REST routes, behind bearer authentication.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chats", get(chats::list_chats).post(chats::start_chat))
        .route("/chats/{chat_id}", get(chats::get_chat))
        .route("/chats/{chat_id}/open", post(chats::open_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route("/security/password-changed", post(security::password_changed))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state)
}
