use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use wardline_chat::notifications;
use wardline_types::api::Claims;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let items = notifications::list(&state.db, &claims.sub, query.limit.min(100)).await?;
    Ok(Json(items))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = notifications::mark_read(&state.db, &id, &claims.sub).await?;
    Ok(Json(notification))
}
