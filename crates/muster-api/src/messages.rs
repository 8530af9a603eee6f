use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use muster_types::api::{
    Claims, CreateMessageRequest, MessageListQuery, Page, ScheduleMessageRequest,
    SendMessageRequest, UpdateMessageRequest, UpdateSendStatusRequest,
};

use crate::auth::AppState;
use crate::error::{ApiError, join_err};
use crate::response::{created, empty_success, page_params, success};

fn validate_subject(subject: &str) -> Result<(), ApiError> {
    let len = subject.trim().chars().count();
    if (1..=255).contains(&len) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "subject must be between 1 and 255 characters".to_string(),
        ))
    }
}

fn validate_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        Err(ApiError::Validation("content is required".to_string()))
    } else {
        Ok(())
    }
}

fn validate_schedule(when: DateTime<Utc>) -> Result<(), ApiError> {
    if when > Utc::now() {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "scheduled_at must be in the future".to_string(),
        ))
    }
}

pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<Response, ApiError> {
    validate_subject(&req.subject)?;
    validate_content(&req.content)?;
    if let Some(when) = req.scheduled_at {
        validate_schedule(when)?;
    }

    let id = Uuid::new_v4();
    let worker = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        worker
            .db
            .create_message(id, claims.sub, &req)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(created(message, "Message created"))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageListQuery>,
) -> Result<Response, ApiError> {
    let (page, limit) = page_params(query.page, query.limit);

    let worker = state.clone();
    let (items, total) = tokio::task::spawn_blocking(move || {
        worker
            .db
            .list_messages(claims.sub, page, limit, query.status, query.event_id)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(Page { items, total, page, limit }, "Messages"))
}

pub async fn get_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        worker.db.get_message(id, claims.sub).map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(message, "Message"))
}

pub async fn update_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<Response, ApiError> {
    validate_subject(&req.subject)?;
    validate_content(&req.content)?;
    if let Some(when) = req.scheduled_at {
        validate_schedule(when)?;
    }

    let worker = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        worker
            .db
            .update_message(id, claims.sub, &req)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(message, "Message updated"))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    tokio::task::spawn_blocking(move || worker.db.delete_message(id, claims.sub).map_err(ApiError::from))
        .await
        .map_err(join_err)??;

    Ok(empty_success("Message deleted"))
}

pub async fn schedule_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<ScheduleMessageRequest>,
) -> Result<Response, ApiError> {
    validate_schedule(req.scheduled_at)?;

    let worker = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        worker
            .db
            .schedule_message(id, claims.sub, req.scheduled_at)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(message, "Message scheduled"))
}

/// Dispatch to the outbox. No transport I/O happens here; the message ends
/// up `sent` with one pending send row per recipient, and a delivery worker
/// reports per-recipient progress later.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    if req.recipient_ids.is_empty() {
        return Err(ApiError::Validation(
            "at least one recipient is required".to_string(),
        ));
    }

    let worker = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        worker
            .db
            .send_message(id, claims.sub, &req.recipient_ids)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(message, "Message sent"))
}

pub async fn list_sends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let sends = tokio::task::spawn_blocking(move || {
        worker.db.list_sends(id, claims.sub).map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(sends, "Message sends"))
}

/// Callback surface for the external delivery worker.
pub async fn update_send_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(send_id): Path<Uuid>,
    Json(req): Json<UpdateSendStatusRequest>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let send = tokio::task::spawn_blocking(move || {
        worker
            .db
            .update_send_status(send_id, claims.sub, req.status, req.error_message.as_deref())
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(send, "Send status updated"))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn subject_and_content_rules() {
        assert!(validate_subject("Hi").is_ok());
        assert!(validate_subject("   ").is_err());
        assert!(validate_subject(&"x".repeat(256)).is_err());
        assert!(validate_content("body").is_ok());
        assert!(validate_content(" ").is_err());
    }

    #[test]
    fn schedule_date_must_be_future() {
        assert!(validate_schedule(Utc::now() + Duration::hours(1)).is_ok());
        assert!(validate_schedule(Utc::now() - Duration::hours(1)).is_err());
    }
}
