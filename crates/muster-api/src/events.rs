use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use muster_types::api::{
    AddParticipantRequest, Claims, CreateEventRequest, EventListQuery, LimitQuery, Page,
    SearchQuery, UpdateEventRequest,
};
use muster_types::models::ParticipantStatus;

use crate::auth::AppState;
use crate::error::{ApiError, join_err};
use crate::response::{created, empty_success, page_params, success};

fn validate_title(title: &str) -> Result<(), ApiError> {
    let len = title.trim().chars().count();
    if (3..=255).contains(&len) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "title must be between 3 and 255 characters".to_string(),
        ))
    }
}

fn validate_max_participants(max: Option<i64>) -> Result<(), ApiError> {
    match max {
        Some(n) if n < 1 => Err(ApiError::Validation(
            "max_participants must be at least 1".to_string(),
        )),
        _ => Ok(()),
    }
}

fn require_future(when: DateTime<Utc>, field: &str) -> Result<(), ApiError> {
    if when > Utc::now() {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("{field} must be in the future")))
    }
}

fn validate_search_term(q: &str) -> Result<(), ApiError> {
    if q.trim().is_empty() {
        Err(ApiError::Validation("a search term is required".to_string()))
    } else {
        Ok(())
    }
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEventRequest>,
) -> Result<Response, ApiError> {
    validate_title(&req.title)?;
    require_future(req.event_date, "event_date")?;
    validate_max_participants(req.max_participants)?;

    let id = Uuid::new_v4();
    let worker = state.clone();
    let event = tokio::task::spawn_blocking(move || {
        worker
            .db
            .create_event(id, claims.sub, &req)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(created(event, "Event created"))
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<EventListQuery>,
) -> Result<Response, ApiError> {
    let (page, limit) = page_params(query.page, query.limit);

    let worker = state.clone();
    let (items, total) = tokio::task::spawn_blocking(move || {
        worker
            .db
            .list_events(
                claims.sub,
                page,
                limit,
                query.status,
                query.sort_by.as_deref(),
                query.sort_order.as_deref(),
            )
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(Page { items, total, page, limit }, "Events"))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let event =
        tokio::task::spawn_blocking(move || worker.db.get_event(id, claims.sub).map_err(ApiError::from))
            .await
            .map_err(join_err)??;

    Ok(success(event, "Event"))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Response, ApiError> {
    validate_title(&req.title)?;
    validate_max_participants(req.max_participants)?;

    let worker = state.clone();
    let event = tokio::task::spawn_blocking(move || {
        worker
            .db
            .update_event(id, claims.sub, &req)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(event, "Event updated"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    tokio::task::spawn_blocking(move || worker.db.delete_event(id, claims.sub).map_err(ApiError::from))
        .await
        .map_err(join_err)??;

    Ok(empty_success("Event deleted"))
}

pub async fn add_participant(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<AddParticipantRequest>,
) -> Result<Response, ApiError> {
    let status = req.status.unwrap_or(ParticipantStatus::Invited);

    let worker = state.clone();
    let participant = tokio::task::spawn_blocking(move || {
        worker
            .db
            .add_participant(
                Uuid::new_v4(),
                event_id,
                req.recipient_id,
                claims.sub,
                status,
                req.notes.as_deref(),
            )
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(participant, "Participant saved"))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((event_id, recipient_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    tokio::task::spawn_blocking(move || {
        worker
            .db
            .remove_participant(event_id, recipient_id, claims.sub)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(empty_success("Participant removed"))
}

pub async fn list_participants(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let participants = tokio::task::spawn_blocking(move || {
        worker
            .db
            .get_participants(event_id, claims.sub)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(participants, "Participants"))
}

pub async fn search_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    validate_search_term(&query.q)?;

    let worker = state.clone();
    let events = tokio::task::spawn_blocking(move || {
        worker
            .db
            .search_events(claims.sub, query.q.trim())
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(events, "Search results"))
}

pub async fn upcoming_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<LimitQuery>,
) -> Result<Response, ApiError> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let worker = state.clone();
    let events = tokio::task::spawn_blocking(move || {
        worker
            .db
            .upcoming_events(claims.sub, limit)
            .map_err(ApiError::from)
    })
    .await
    .map_err(join_err)??;

    Ok(success(events, "Upcoming events"))
}

pub async fn event_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let worker = state.clone();
    let stats =
        tokio::task::spawn_blocking(move || worker.db.event_stats(claims.sub).map_err(ApiError::from))
            .await
            .map_err(join_err)??;

    Ok(success(stats, "Event stats"))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn title_bounds() {
        assert!(validate_title("ab").is_err());
        assert!(validate_title("abc").is_ok());
        assert!(validate_title(&"x".repeat(255)).is_ok());
        assert!(validate_title(&"x".repeat(256)).is_err());
        // surrounding whitespace doesn't count
        assert!(validate_title("  a  ").is_err());
    }

    #[test]
    fn event_date_must_be_future_on_create() {
        assert!(require_future(Utc::now() + Duration::days(1), "event_date").is_ok());
        assert!(require_future(Utc::now() - Duration::days(1), "event_date").is_err());
    }

    #[test]
    fn max_participants_lower_bound() {
        assert!(validate_max_participants(None).is_ok());
        assert!(validate_max_participants(Some(1)).is_ok());
        assert!(validate_max_participants(Some(0)).is_err());
        assert!(validate_max_participants(Some(-5)).is_err());
    }

    #[test]
    fn search_term_required() {
        assert!(validate_search_term("conf").is_ok());
        assert!(validate_search_term("   ").is_err());
    }
}
