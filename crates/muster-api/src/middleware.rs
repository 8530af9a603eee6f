use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};

use muster_types::api::Claims;

use crate::auth::AppState;
use crate::error::{ApiError, join_err};

/// Bearer authentication. After the signature and expiry check, the account
/// row is re-read so a deactivated or deleted user loses access immediately,
/// unexpired token or not.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::InvalidToken)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => ApiError::TokenExpired,
        _ => ApiError::InvalidToken,
    })?;

    let user_id = token_data.claims.sub;
    let worker = state.clone();
    let user = tokio::task::spawn_blocking(move || worker.db.get_user_by_id(user_id))
        .await
        .map_err(join_err)?
        .map_err(ApiError::from)?;
    match user {
        Some(u) if u.is_active => {}
        _ => return Err(ApiError::InvalidToken),
    }

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
