use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use wardline_chat::{projector, reconciler, repository};
use wardline_types::api::{Claims, OpenChatResponse, StartChatRequest, StartChatResponse};

use crate::AppState;
use crate::error::ApiError;

pub async fn start_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = repository::get_or_create(&state.db, &claims.sub, &req.other_id).await?;
    Ok((StatusCode::OK, Json(StartChatResponse { chat_id })))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chats = projector::conversation_list(&state.db, &claims.sub).await?;
    Ok(Json(chats))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = repository::get_for_participant(&state.db, &chat_id, &claims.sub).await?;
    Ok(Json(chat))
}

/// Viewing a conversation over REST: zero the caller's unread counter and
/// mark everything inbound as read.
pub async fn open_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let marked_read = reconciler::open_and_reconcile(&state.db, &chat_id, &claims.sub).await?;
    Ok(Json(OpenChatResponse { chat_id, marked_read }))
}
