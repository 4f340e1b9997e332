use axum::{Extension, Json, extract::State, response::IntoResponse};

use wardline_chat::notifications;
use wardline_types::api::Claims;

use crate::AppState;
use crate::error::ApiError;

/// Called by the settings flow after the caller's password was changed.
/// Fans a security notice out to every administrator.
pub async fn password_changed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let notified = notifications::password_changed(&state.db, &claims.profile()).await?;
    Ok(Json(serde_json::json!({ "notified": notified })))
}
