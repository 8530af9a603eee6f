use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use muster_db::error::StoreError;

use crate::response::error as error_response;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("access denied")]
    AccessDenied,

    #[error("resource not found")]
    NotFound,

    #[error("email already exists")]
    DuplicateEmail,

    #[error("message has already been sent")]
    AlreadySent,

    #[error("sent messages cannot be modified")]
    CannotModifySent,

    #[error("a message cannot be deleted while it is sending")]
    CannotDeleteSending,

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::InvalidToken | ApiError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::AccessDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::DuplicateEmail
            | ApiError::AlreadySent
            | ApiError::CannotModifySent
            | ApiError::CannotDeleteSending => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::InvalidToken => "INVALID_TOKEN",
            ApiError::TokenExpired => "TOKEN_EXPIRED",
            ApiError::AccessDenied => "ACCESS_DENIED",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::DuplicateEmail => "DUPLICATE_EMAIL",
            ApiError::AlreadySent => "ALREADY_SENT",
            ApiError::CannotModifySent => "CANNOT_MODIFY_SENT",
            ApiError::CannotDeleteSending => "CANNOT_DELETE_SENDING",
            ApiError::Internal => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::AccessDenied => ApiError::AccessDenied,
            StoreError::DuplicateEmail => ApiError::DuplicateEmail,
            StoreError::AlreadySent => ApiError::AlreadySent,
            StoreError::CannotModifySent => ApiError::CannotModifySent,
            StoreError::CannotDeleteSending => ApiError::CannotDeleteSending,
            // internal detail stays in the logs, never in the response
            StoreError::Sqlite(e) => {
                error!(error = %e, "storage failure");
                ApiError::Internal
            }
            StoreError::Internal(msg) => {
                error!(message = %msg, "storage failure");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error_response(self.code(), self.to_string(), None, status)
    }
}

pub(crate) fn join_err(e: tokio::task::JoinError) -> ApiError {
    error!(error = %e, "blocking task failed");
    ApiError::Internal
}
