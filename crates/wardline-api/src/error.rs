use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use wardline_chat::ChatError;
use wardline_types::api::ErrorResponse;

/// Handler error: a chat error rendered as a status code plus a JSON body.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self(e)
    }
}

pub fn status_for(e: &ChatError) -> StatusCode {
    match e {
        ChatError::NotFound(_) | ChatError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::SendFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::AuthRequired => StatusCode::UNAUTHORIZED,
        ChatError::EmptyMessage | ChatError::InvalidParticipants => StatusCode::BAD_REQUEST,
        ChatError::NotParticipant { .. } => StatusCode::FORBIDDEN,
        ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", error_chain(&self.0));
        }

        // Store internals stay in the log.
        let message = match &self.0 {
            ChatError::Store(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.kind().to_string(),
                message,
            }),
        )
            .into_response()
    }
}

fn error_chain(e: &ChatError) -> String {
    let mut out = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}
