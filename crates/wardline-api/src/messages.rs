use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use wardline_chat::{repository, stream};
use wardline_types::api::{Claims, SendMessageRequest};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = stream::send(&state.db, &chat_id, &claims.sub, &req.text, req.attachment).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    repository::get_for_participant(&state.db, &chat_id, &claims.sub).await?;
    let limit = query.limit.min(stream::MESSAGE_WINDOW);
    let messages = stream::messages(&state.db, &chat_id, limit).await?;
    Ok(Json(messages))
}
