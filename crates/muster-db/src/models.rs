//! Row mapping between SQLite and the shared API models.
//!
//! Ids are TEXT UUIDs, timestamps are TEXT in a fixed-width UTC format so
//! that lexicographic SQL comparison is chronological, and tags/metadata are
//! JSON text columns.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use muster_types::models::{Event, Message, MessageSend, Participant, Recipient, User};

use crate::error::{StoreError, StoreResult};

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// Fixed-width UTC timestamp for storage and SQL comparison.
pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.format(TS_FORMAT).to_string()
}

pub(crate) fn opt_ts(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(ts)
}

pub(crate) fn json_text<T: Serialize>(v: &T) -> StoreResult<String> {
    serde_json::to_string(v).map_err(|e| StoreError::Internal(format!("json encode: {e}")))
}

fn conv_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

pub(crate) fn uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|e: uuid::Error| conv_err(idx, format!("bad uuid {s:?}: {e}")))
}

pub(crate) fn opt_uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e: uuid::Error| conv_err(idx, format!("bad uuid {s:?}: {e}"))),
        None => Ok(None),
    }
}

pub(crate) fn ts_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conv_err(idx, format!("bad timestamp {s:?}: {e}")))
}

pub(crate) fn opt_ts_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| conv_err(idx, format!("bad timestamp {s:?}: {e}"))),
        None => Ok(None),
    }
}

pub(crate) fn enum_col<T: FromStr>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|_| conv_err(idx, format!("unrecognized value {s:?}")))
}

pub(crate) fn tags_col(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conv_err(idx, format!("bad tags json: {e}")))
}

pub(crate) fn meta_col(row: &Row, idx: usize) -> rusqlite::Result<Value> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conv_err(idx, format!("bad metadata json: {e}")))
}

// -- Users --

/// The only row type distinct from its API model: the password hash stays in
/// the db layer.
#[derive(Debug)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const USER_COLS: &str = "id, email, password_hash, first_name, last_name, \
     company_name, is_active, email_verified, last_login_at, created_at, updated_at";

impl UserRow {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(UserRow {
            id: uuid_col(row, 0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            company_name: row.get(5)?,
            is_active: row.get(6)?,
            email_verified: row.get(7)?,
            last_login_at: opt_ts_col(row, 8)?,
            created_at: ts_col(row, 9)?,
            updated_at: ts_col(row, 10)?,
        })
    }

    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            company_name: self.company_name,
            is_active: self.is_active,
            email_verified: self.email_verified,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// -- Events --

pub(crate) const EVENT_COLS: &str = "id, user_id, title, description, event_date, location, \
     status, max_participants, current_participants, is_public, registration_deadline, \
     tags, metadata, created_at, updated_at";

pub(crate) fn event_from_row(row: &Row) -> rusqlite::Result<Event> {
    Ok(Event {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        event_date: ts_col(row, 4)?,
        location: row.get(5)?,
        status: enum_col(row, 6)?,
        max_participants: row.get(7)?,
        current_participants: row.get(8)?,
        is_public: row.get(9)?,
        registration_deadline: opt_ts_col(row, 10)?,
        tags: tags_col(row, 11)?,
        metadata: meta_col(row, 12)?,
        created_at: ts_col(row, 13)?,
        updated_at: ts_col(row, 14)?,
    })
}

pub(crate) const PARTICIPANT_COLS: &str =
    "id, event_id, recipient_id, status, invited_at, responded_at, attended_at, notes";

pub(crate) fn participant_from_row(row: &Row) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: uuid_col(row, 0)?,
        event_id: uuid_col(row, 1)?,
        recipient_id: uuid_col(row, 2)?,
        status: enum_col(row, 3)?,
        invited_at: ts_col(row, 4)?,
        responded_at: opt_ts_col(row, 5)?,
        attended_at: opt_ts_col(row, 6)?,
        notes: row.get(7)?,
    })
}

// -- Recipients --

pub(crate) const RECIPIENT_COLS: &str = "id, user_id, email, first_name, last_name, phone, \
     company, position, tags, notes, is_active, opt_out, opt_out_date, metadata, \
     created_at, updated_at";

pub(crate) fn recipient_from_row(row: &Row) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        phone: row.get(5)?,
        company: row.get(6)?,
        position: row.get(7)?,
        tags: tags_col(row, 8)?,
        notes: row.get(9)?,
        is_active: row.get(10)?,
        opt_out: row.get(11)?,
        opt_out_date: opt_ts_col(row, 12)?,
        metadata: meta_col(row, 13)?,
        created_at: ts_col(row, 14)?,
        updated_at: ts_col(row, 15)?,
    })
}

// -- Messages --

pub(crate) const MESSAGE_COLS: &str = "id, user_id, event_id, subject, content, message_type, \
     status, scheduled_at, sent_at, total_recipients, successful_sends, failed_sends, \
     metadata, created_at, updated_at";

pub(crate) fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        event_id: opt_uuid_col(row, 2)?,
        subject: row.get(3)?,
        content: row.get(4)?,
        message_type: enum_col(row, 5)?,
        status: enum_col(row, 6)?,
        scheduled_at: opt_ts_col(row, 7)?,
        sent_at: opt_ts_col(row, 8)?,
        total_recipients: row.get(9)?,
        successful_sends: row.get(10)?,
        failed_sends: row.get(11)?,
        metadata: meta_col(row, 12)?,
        created_at: ts_col(row, 13)?,
        updated_at: ts_col(row, 14)?,
    })
}

pub(crate) const SEND_COLS: &str = "id, message_id, recipient_id, recipient_email, status, \
     sent_at, delivered_at, read_at, error_message, created_at";

pub(crate) fn send_from_row(row: &Row) -> rusqlite::Result<MessageSend> {
    Ok(MessageSend {
        id: uuid_col(row, 0)?,
        message_id: uuid_col(row, 1)?,
        recipient_id: opt_uuid_col(row, 2)?,
        recipient_email: row.get(3)?,
        status: enum_col(row, 4)?,
        sent_at: opt_ts_col(row, 5)?,
        delivered_at: opt_ts_col(row, 6)?,
        read_at: opt_ts_col(row, 7)?,
        error_message: row.get(8)?,
        created_at: ts_col(row, 9)?,
    })
}
