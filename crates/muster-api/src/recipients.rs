use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::Response,
};
use uuid::Uuid;

use muster_types::api::{
    BulkCreateRecipientsRequest, BulkCreateResponse, Claims, CreateRecipientRequest, Page,
    RecipientListQuery, SearchQuery, UpdateRecipientRequest,
};

use crate::auth::{AppState, validate_email};
use crate::error::{ApiError, join_err};
use crate::response::{created, empty_success, page_params, success};

pub async fn create_recipient(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRecipientRequest>,
) -> Result<Response, ApiError> {
    validate_email(&req.email)?;

    let id = Uuid::new_v4();
    let worker = state.clone();
    let recipient = tokio::task::spawn_blocking(move || {
        worker
            .db
            .create_recipient(id, claims.sub, &req)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(created(recipient, "Recipient created"))
}

/// Whole-batch import: duplicate emails are skipped silently, anything else
/// aborts the entire batch.
pub async fn bulk_create_recipients(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BulkCreateRecipientsRequest>,
) -> Result<Response, ApiError> {
    if req.recipients.is_empty() {
        return Err(ApiError::Validation(
            "at least one recipient is required".to_string(),
        ));
    }
    for r in &req.recipients {
        validate_email(&r.email)?;
    }

    let worker = state.clone();
    let (created_count, skipped) = tokio::task::spawn_blocking(move || {
        worker
            .db
            .bulk_create_recipients(claims.sub, &req.recipients)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(created(
        BulkCreateResponse {
            created: created_count,
            skipped,
        },
        "Recipients imported",
    ))
}

pub async fn list_recipients(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RecipientListQuery>,
) -> Result<Response, ApiError> {
    let (page, limit) = page_params(query.page, query.limit);

    let worker = state.clone();
    let (items, total) = tokio::task::spawn_blocking(move || {
        worker
            .db
            .list_recipients(claims.sub, page, limit, query.is_active)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(Page { items, total, page, limit }, "Recipients"))
}

pub async fn get_recipient(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let recipient = tokio::task::spawn_blocking(move || {
        worker.db.get_recipient(id, claims.sub).map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(recipient, "Recipient"))
}

pub async fn update_recipient(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRecipientRequest>,
) -> Result<Response, ApiError> {
    validate_email(&req.email)?;

    let worker = state.clone();
    let recipient = tokio::task::spawn_blocking(move || {
        worker
            .db
            .update_recipient(id, claims.sub, &req)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(recipient, "Recipient updated"))
}

pub async fn delete_recipient(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    tokio::task::spawn_blocking(move || {
        worker.db.delete_recipient(id, claims.sub).map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(empty_success("Recipient deleted"))
}

pub async fn opt_out(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let recipient = tokio::task::spawn_blocking(move || {
        worker
            .db
            .set_opt_out(id, claims.sub, true)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(recipient, "Recipient opted out"))
}

pub async fn opt_in(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let recipient = tokio::task::spawn_blocking(move || {
        worker
            .db
            .set_opt_out(id, claims.sub, false)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(recipient, "Recipient opted in"))
}

pub async fn search_recipients(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::Validation("a search term is required".to_string()));
    }

    let worker = state.clone();
    let recipients = tokio::task::spawn_blocking(move || {
        worker
            .db
            .search_recipients(claims.sub, query.q.trim())
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(recipients, "Search results"))
}

pub async fn recipient_tags(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let tags = tokio::task::spawn_blocking(move || {
        worker.db.all_recipient_tags(claims.sub).map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(tags, "Tags"))
}

pub async fn recipient_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let stats = tokio::task::spawn_blocking(move || {
        worker.db.recipient_stats(claims.sub).map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(stats, "Recipient stats"))
}
