use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{Extension, Json, extract::State, response::Response};
use tracing::error;

use muster_types::api::{ChangePasswordRequest, Claims, UpdateProfileRequest};

use crate::auth::{AppState, hash_password, validate_password};
use crate::error::{ApiError, join_err};
use crate::response::{empty_success, success};

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        worker
            .db
            .update_profile(claims.sub, &req.first_name, &req.last_name, &req.company_name)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(user.into_user(), "Profile updated"))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    validate_password(&req.new_password)?;

    let worker = state.clone();
    tokio::task::spawn_blocking(move || {
        let user = worker
            .db
            .get_user_by_id(claims.sub)
            .map_err(ApiError::from)?
            .ok_or(ApiError::NotFound)?;

        let parsed = PasswordHash::new(&user.password_hash).map_err(|e| {
            error!(error = %e, "stored password hash is unreadable");
            ApiError::Internal
        })?;
        Argon2::default()
            .verify_password(req.current_password.as_bytes(), &parsed)
            .map_err(|_| ApiError::InvalidCredentials)?;

        let hash = hash_password(&req.new_password)?;
        worker
            .db
            .update_password(claims.sub, &hash)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(empty_success("Password changed"))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    tokio::task::spawn_blocking(move || {
        worker
            .db
            .set_user_active(claims.sub, false)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(empty_success("Account deactivated"))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    tokio::task::spawn_blocking(move || worker.db.delete_user(claims.sub).map_err(ApiError::from))
        .await
        .map_err(join_err)??;

    Ok(empty_success("Account deleted"))
}
