use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, response::Response};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, warn};
use uuid::Uuid;

use muster_db::Database;
use muster_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::error::{ApiError, join_err};
use crate::response::{created, success};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;

    let user_id = Uuid::new_v4();

    // Argon2 is deliberately slow; run it with the insert off the async runtime
    let worker = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        let hash = hash_password(&req.password)?;
        worker
            .db
            .create_user(
                user_id,
                &req.email,
                &hash,
                &req.first_name,
                &req.last_name,
                &req.company_name,
            )
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    let token = create_token(&state.jwt_secret, state.token_ttl_hours, user_id, &user.email)?;

    Ok(created(
        AuthResponse {
            user: user.into_user(),
            token,
        },
        "Account created",
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        // unknown email and wrong password produce the same outcome, so the
        // endpoint can't be used to enumerate accounts
        let user = worker
            .db
            .get_user_by_email(&req.email)
            .map_err(ApiError::from)?
            .ok_or(ApiError::InvalidCredentials)?;

        let parsed = PasswordHash::new(&user.password_hash).map_err(|e| {
            error!(error = %e, "stored password hash is unreadable");
            ApiError::Internal
        })?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed)
            .map_err(|_| ApiError::InvalidCredentials)?;

        if !user.is_active {
            return Err(ApiError::InvalidCredentials);
        }

        // best-effort stamp; a failure here must not fail the login
        if let Err(e) = worker.db.touch_last_login(user.id) {
            warn!(error = %e, "failed to stamp last login");
        }

        Ok(user)
    })
    .await
    .map_err(join_err)??;

    let token = create_token(&state.jwt_secret, state.token_ttl_hours, user.id, &user.email)?;

    Ok(success(
        AuthResponse {
            user: user.into_user(),
            token,
        },
        "Login successful",
    ))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let user = lookup_user(&state, claims.sub).await?;
    Ok(success(user.into_user(), "Current user"))
}

pub(crate) async fn lookup_user(
    state: &AppState,
    user_id: Uuid,
) -> Result<muster_db::models::UserRow, ApiError> {
    let worker = state.clone();
    tokio::task::spawn_blocking(move || worker.db.get_user_by_id(user_id))
        .await
        .map_err(join_err)?
        .map_err(ApiError::from)?
        .ok_or(ApiError::NotFound)
}

pub fn create_token(
    secret: &str,
    ttl_hours: i64,
    user_id: Uuid,
    email: &str,
) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!(error = %e, "token encoding failed");
        ApiError::Internal
    })
}

pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            ApiError::Internal
        })?
        .to_string())
}

pub(crate) fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.len() >= 3 && email.len() <= 255 && email.contains('@') {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "a valid email address is required".to_string(),
        ))
    }
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() >= 8 {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "password must be at least 8 characters".to_string(),
        ))
    }
}
