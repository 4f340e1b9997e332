use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use wardline_chat::ChatError;
use wardline_types::api::Claims;

use crate::AppState;
use crate::error::ApiError;

/// Validate a bearer token and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .ok()
        .map(|data| data.claims)
}

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ChatError::AuthRequired)?;

    let claims = verify_token(&state.jwt_secret, token).ok_or(ChatError::AuthRequired)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
