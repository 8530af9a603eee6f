use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    EventStatus, MessageStatus, MessageType, ParticipantStatus, SendStatus, User,
};

// -- JWT Claims --

/// JWT claims shared between token issuance (auth handlers) and the bearer
/// middleware. Canonical definition lives here in muster-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// -- Users --

/// Full replacement of the mutable profile fields.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// -- Pagination --

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

// -- Events --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub max_participants: Option<i64>,
    #[serde(default)]
    pub is_public: bool,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

/// Full-row replacement: every mutable field must be supplied.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub location: Option<String>,
    pub status: EventStatus,
    pub max_participants: Option<i64>,
    pub is_public: bool,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<EventStatus>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddParticipantRequest {
    pub recipient_id: Uuid,
    pub status: Option<ParticipantStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventStats {
    pub total: i64,
    pub draft: i64,
    pub active: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub upcoming: i64,
    pub total_participants: i64,
}

// -- Recipients --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRecipientRequest {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

/// Full-row replacement: every mutable field must be supplied.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRecipientRequest {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkCreateRecipientsRequest {
    pub recipients: Vec<CreateRecipientRequest>,
}

#[derive(Debug, Serialize)]
pub struct BulkCreateResponse {
    pub created: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
pub struct RecipientListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecipientStats {
    pub total: i64,
    pub active: i64,
    pub opted_out: i64,
    pub with_company: i64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    pub subject: String,
    pub content: String,
    pub message_type: Option<MessageType>,
    pub event_id: Option<Uuid>,
    pub status: Option<MessageStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

/// Full-row replacement of the mutable message fields. Status is not part of
/// this DTO: it only moves through the schedule and send operations.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMessageRequest {
    pub subject: String,
    pub content: String,
    pub message_type: MessageType,
    pub event_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<MessageStatus>,
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleMessageRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSendStatusRequest {
    pub status: SendStatus,
    pub error_message: Option<String>,
}
