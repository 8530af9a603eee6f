use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use muster_types::api::{CreateMessageRequest, UpdateMessageRequest};
use muster_types::models::{Message, MessageSend, MessageStatus, MessageType, SendStatus};

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{self, MESSAGE_COLS, SEND_COLS, message_from_row, send_from_row};

/// (owner, status) of a message, or NotFound.
fn message_state(conn: &Connection, message_id: &str) -> StoreResult<(String, MessageStatus)> {
    let state: Option<(String, String)> = conn
        .query_row(
            "SELECT user_id, status FROM messages WHERE id = ?1",
            [message_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    match state {
        None => Err(StoreError::NotFound),
        Some((owner, status)) => {
            let status = status
                .parse()
                .map_err(|e: String| StoreError::Internal(e))?;
            Ok((owner, status))
        }
    }
}

fn check_message_owner(
    conn: &Connection,
    message_id: &str,
    user_id: Uuid,
) -> StoreResult<MessageStatus> {
    let (owner, status) = message_state(conn, message_id)?;
    if owner != user_id.to_string() {
        return Err(StoreError::AccessDenied);
    }
    Ok(status)
}

fn check_event_link(conn: &Connection, event_id: Uuid, user_id: Uuid) -> StoreResult<()> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT user_id FROM events WHERE id = ?1",
            [event_id.to_string()],
            |r| r.get(0),
        )
        .optional()?;
    match owner {
        None => Err(StoreError::NotFound),
        Some(o) if o != user_id.to_string() => Err(StoreError::AccessDenied),
        Some(_) => Ok(()),
    }
}

/// Successful/failed counters are derived from the send rows, mirroring how
/// event participant totals are handled.
fn recount_sends(conn: &Connection, message_id: &str) -> StoreResult<()> {
    conn.execute(
        "UPDATE messages SET \
             successful_sends = (SELECT COUNT(*) FROM message_sends \
                 WHERE message_id = ?1 AND status IN ('sent', 'delivered', 'read')), \
             failed_sends = (SELECT COUNT(*) FROM message_sends \
                 WHERE message_id = ?1 AND status = 'failed') \
         WHERE id = ?1",
        [message_id],
    )?;
    Ok(())
}

fn fetch_message(conn: &Connection, message_id: &str) -> StoreResult<Message> {
    let message = conn.query_row(
        &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1"),
        [message_id],
        message_from_row,
    )?;
    Ok(message)
}

impl Database {
    pub fn create_message(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: &CreateMessageRequest,
    ) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(event_id) = req.event_id {
                check_event_link(&tx, event_id, user_id)?;
            }

            let now = models::ts(Utc::now());
            let message_type = req.message_type.unwrap_or(MessageType::Email);
            let status = req.status.unwrap_or(MessageStatus::Draft);
            tx.execute(
                "INSERT INTO messages (id, user_id, event_id, subject, content, message_type, \
                 status, scheduled_at, total_recipients, successful_sends, failed_sends, \
                 metadata, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, 0, ?9, ?10, ?10)",
                params![
                    id.to_string(),
                    user_id.to_string(),
                    req.event_id.map(|e| e.to_string()),
                    req.subject,
                    req.content,
                    message_type.as_str(),
                    status.as_str(),
                    models::opt_ts(req.scheduled_at),
                    models::json_text(&req.metadata)?,
                    now
                ],
            )?;

            let message = fetch_message(&tx, &id.to_string())?;
            tx.commit()?;
            Ok(message)
        })
    }

    pub fn get_message(&self, id: Uuid, user_id: Uuid) -> StoreResult<Message> {
        self.with_conn(|conn| {
            let message = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1"),
                    [id.to_string()],
                    message_from_row,
                )
                .optional()?;
            match message {
                None => Err(StoreError::NotFound),
                Some(m) if m.user_id != user_id => Err(StoreError::AccessDenied),
                Some(m) => Ok(m),
            }
        })
    }

    pub fn list_messages(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
        status: Option<MessageStatus>,
        event_id: Option<Uuid>,
    ) -> StoreResult<(Vec<Message>, i64)> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page as u64 - 1) * limit as u64;

        self.with_conn(|conn| {
            let uid = user_id.to_string();
            let st = status.map(|s| s.as_str().to_string());
            let eid = event_id.map(|e| e.to_string());

            let mut where_sql = String::from("user_id = ?1");
            let mut sql_params: Vec<&dyn rusqlite::types::ToSql> = vec![&uid];
            if let Some(ref s) = st {
                where_sql.push_str(&format!(" AND status = ?{}", sql_params.len() + 1));
                sql_params.push(s);
            }
            if let Some(ref e) = eid {
                where_sql.push_str(&format!(" AND event_id = ?{}", sql_params.len() + 1));
                sql_params.push(e);
            }

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM messages WHERE {where_sql}"),
                sql_params.as_slice(),
                |r| r.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLS} FROM messages WHERE {where_sql} \
                 ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}"
            ))?;
            let messages = stmt
                .query_map(sql_params.as_slice(), message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok((messages, total))
        })
    }

    /// Full-row replacement of the mutable fields. Rejected once the message
    /// has been sent or while it is sending.
    pub fn update_message(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: &UpdateMessageRequest,
    ) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mid = id.to_string();
            let status = check_message_owner(&tx, &mid, user_id)?;
            if matches!(status, MessageStatus::Sent | MessageStatus::Sending) {
                return Err(StoreError::CannotModifySent);
            }
            if let Some(event_id) = req.event_id {
                check_event_link(&tx, event_id, user_id)?;
            }

            tx.execute(
                "UPDATE messages SET subject = ?1, content = ?2, message_type = ?3, \
                 event_id = ?4, scheduled_at = ?5, metadata = ?6, updated_at = ?7 \
                 WHERE id = ?8",
                params![
                    req.subject,
                    req.content,
                    req.message_type.as_str(),
                    req.event_id.map(|e| e.to_string()),
                    models::opt_ts(req.scheduled_at),
                    models::json_text(&req.metadata)?,
                    models::ts(Utc::now()),
                    mid
                ],
            )?;

            let message = fetch_message(&tx, &mid)?;
            tx.commit()?;
            Ok(message)
        })
    }

    pub fn delete_message(&self, id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mid = id.to_string();
            let status = check_message_owner(&tx, &mid, user_id)?;
            if status == MessageStatus::Sending {
                return Err(StoreError::CannotDeleteSending);
            }
            // send rows cascade with the message
            tx.execute("DELETE FROM messages WHERE id = ?1", [mid])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Allowed from any pre-send state; the date check lives at the boundary.
    pub fn schedule_message(
        &self,
        id: Uuid,
        user_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mid = id.to_string();
            let status = check_message_owner(&tx, &mid, user_id)?;
            match status {
                MessageStatus::Draft | MessageStatus::Scheduled | MessageStatus::Failed => {}
                MessageStatus::Sent | MessageStatus::Sending => {
                    return Err(StoreError::AlreadySent);
                }
            }

            tx.execute(
                "UPDATE messages SET status = 'scheduled', scheduled_at = ?1, updated_at = ?2 \
                 WHERE id = ?3",
                params![models::ts(scheduled_at), models::ts(Utc::now()), mid],
            )?;

            let message = fetch_message(&tx, &mid)?;
            tx.commit()?;
            Ok(message)
        })
    }

    /// Dispatch a message to its outbox: one transaction that marks the
    /// message sending, snapshots every recipient's current email into a
    /// pending send row, and stamps the sent state. Any failure rolls the
    /// whole batch back, leaving the message in its pre-send state. No
    /// transport I/O happens here; `sent` means "dispatched to the outbox".
    pub fn send_message(
        &self,
        id: Uuid,
        user_id: Uuid,
        recipient_ids: &[Uuid],
    ) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mid = id.to_string();
            let status = check_message_owner(&tx, &mid, user_id)?;
            match status {
                MessageStatus::Draft | MessageStatus::Scheduled => {}
                _ => return Err(StoreError::AlreadySent),
            }

            tx.execute(
                "UPDATE messages SET status = 'sending' WHERE id = ?1",
                [&mid],
            )?;

            let now = models::ts(Utc::now());
            for recipient_id in recipient_ids {
                // snapshot the address now so later edits to the contact
                // don't rewrite delivery history
                let email: Option<String> = tx
                    .query_row(
                        "SELECT email FROM recipients WHERE id = ?1 AND user_id = ?2",
                        params![recipient_id.to_string(), user_id.to_string()],
                        |r| r.get(0),
                    )
                    .optional()?;
                let email = email.ok_or(StoreError::NotFound)?;

                tx.execute(
                    "INSERT INTO message_sends (id, message_id, recipient_id, \
                     recipient_email, status, created_at) \
                     VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                    params![
                        Uuid::new_v4().to_string(),
                        mid,
                        recipient_id.to_string(),
                        email,
                        now
                    ],
                )?;
            }

            tx.execute(
                "UPDATE messages SET total_recipients = ?1, status = 'sent', sent_at = ?2, \
                 updated_at = ?2 WHERE id = ?3",
                params![recipient_ids.len() as i64, now, mid],
            )?;

            let message = fetch_message(&tx, &mid)?;
            tx.commit()?;
            Ok(message)
        })
    }

    pub fn list_sends(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<Vec<MessageSend>> {
        self.with_conn(|conn| {
            let mid = message_id.to_string();
            check_message_owner(conn, &mid, user_id)?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {SEND_COLS} FROM message_sends WHERE message_id = ?1 \
                 ORDER BY created_at"
            ))?;
            let sends = stmt
                .query_map([mid], send_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sends)
        })
    }

    /// Callback surface for an external delivery worker: advance one send row
    /// and refresh the parent message's counters. The timestamp matching the
    /// target status is stamped; the error message is only kept on failures.
    pub fn update_send_status(
        &self,
        send_id: Uuid,
        user_id: Uuid,
        status: SendStatus,
        error_message: Option<&str>,
    ) -> StoreResult<MessageSend> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let sid = send_id.to_string();

            let found: Option<(String, String)> = tx
                .query_row(
                    "SELECT s.message_id, m.user_id FROM message_sends s \
                     JOIN messages m ON m.id = s.message_id WHERE s.id = ?1",
                    [&sid],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let (message_id, owner) = found.ok_or(StoreError::NotFound)?;
            if owner != user_id.to_string() {
                return Err(StoreError::AccessDenied);
            }

            let now = models::ts(Utc::now());
            let stamp_col = match status {
                SendStatus::Sent => Some("sent_at"),
                SendStatus::Delivered => Some("delivered_at"),
                SendStatus::Read => Some("read_at"),
                SendStatus::Pending | SendStatus::Failed => None,
            };
            let error = (status == SendStatus::Failed)
                .then_some(error_message)
                .flatten();

            match stamp_col {
                Some(col) => tx.execute(
                    &format!(
                        "UPDATE message_sends SET status = ?1, {col} = ?2, \
                         error_message = ?3 WHERE id = ?4"
                    ),
                    params![status.as_str(), now, error, sid],
                )?,
                None => tx.execute(
                    "UPDATE message_sends SET status = ?1, error_message = ?2 WHERE id = ?3",
                    params![status.as_str(), error, sid],
                )?,
            };

            recount_sends(&tx, &message_id)?;

            let send = tx.query_row(
                &format!("SELECT {SEND_COLS} FROM message_sends WHERE id = ?1"),
                [sid],
                send_from_row,
            )?;
            tx.commit()?;
            Ok(send)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_util;

    fn message_req(subject: &str) -> CreateMessageRequest {
        CreateMessageRequest {
            subject: subject.to_string(),
            content: "Hello there".to_string(),
            message_type: None,
            event_id: None,
            status: None,
            scheduled_at: None,
            metadata: serde_json::json!({}),
        }
    }

    fn send_rows(db: &Database, message_id: Uuid) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM message_sends WHERE message_id = ?1",
                [message_id.to_string()],
                |r| r.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn create_defaults_to_email_draft() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let id = Uuid::new_v4();
        let message = db.create_message(id, owner, &message_req("Hi")).unwrap();

        assert_eq!(message.status, MessageStatus::Draft);
        assert_eq!(message.message_type, MessageType::Email);
        assert_eq!(message.total_recipients, 0);
        assert!(message.sent_at.is_none());
    }

    #[test]
    fn event_link_must_be_owned() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let other = test_util::user(&db, "b@x.com");
        let event_id = Uuid::new_v4();
        db.create_event(event_id, other, &test_util::event_req("Theirs")).unwrap();

        let mut req = message_req("Hi");
        req.event_id = Some(event_id);
        assert!(matches!(
            db.create_message(Uuid::new_v4(), owner, &req).unwrap_err(),
            StoreError::AccessDenied
        ));

        req.event_id = Some(Uuid::new_v4());
        assert!(matches!(
            db.create_message(Uuid::new_v4(), owner, &req).unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[test]
    fn send_creates_pending_rows_and_marks_sent() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let r1 = test_util::recipient(&db, owner, "r1@x.com");
        let r2 = test_util::recipient(&db, owner, "r2@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();

        let sent = db.send_message(id, owner, &[r1, r2]).unwrap();
        assert_eq!(sent.status, MessageStatus::Sent);
        assert_eq!(sent.total_recipients, 2);
        assert!(sent.sent_at.is_some());

        let sends = db.list_sends(id, owner).unwrap();
        assert_eq!(sends.len(), 2);
        assert!(sends.iter().all(|s| s.status == SendStatus::Pending));
        let mut emails: Vec<_> = sends.iter().map(|s| s.recipient_email.clone()).collect();
        emails.sort();
        assert_eq!(emails, vec!["r1@x.com", "r2@x.com"]);
    }

    #[test]
    fn send_twice_is_rejected_and_rows_untouched() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let r1 = test_util::recipient(&db, owner, "r1@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();
        db.send_message(id, owner, &[r1]).unwrap();

        assert!(matches!(
            db.send_message(id, owner, &[r1]).unwrap_err(),
            StoreError::AlreadySent
        ));
        assert_eq!(send_rows(&db, id), 1);
        assert_eq!(db.get_message(id, owner).unwrap().total_recipients, 1);
    }

    #[test]
    fn send_rolls_back_wholesale_on_unknown_recipient() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let r1 = test_util::recipient(&db, owner, "r1@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();

        let err = db.send_message(id, owner, &[r1, Uuid::new_v4()]).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        // nothing from the batch survives and the message is back in draft
        assert_eq!(send_rows(&db, id), 0);
        let message = db.get_message(id, owner).unwrap();
        assert_eq!(message.status, MessageStatus::Draft);
        assert_eq!(message.total_recipients, 0);
        assert!(message.sent_at.is_none());
    }

    #[test]
    fn send_snapshot_survives_recipient_edits() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let r1 = test_util::recipient(&db, owner, "old@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();
        db.send_message(id, owner, &[r1]).unwrap();

        let recipient = db.get_recipient(r1, owner).unwrap();
        let req = muster_types::api::UpdateRecipientRequest {
            email: "new@x.com".to_string(),
            first_name: recipient.first_name,
            last_name: recipient.last_name,
            phone: recipient.phone,
            company: recipient.company,
            position: recipient.position,
            tags: recipient.tags,
            notes: recipient.notes,
            is_active: recipient.is_active,
            metadata: recipient.metadata,
        };
        db.update_recipient(r1, owner, &req).unwrap();

        let sends = db.list_sends(id, owner).unwrap();
        assert_eq!(sends[0].recipient_email, "old@x.com");
    }

    #[test]
    fn sent_messages_are_immutable() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let r1 = test_util::recipient(&db, owner, "r1@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();
        db.send_message(id, owner, &[r1]).unwrap();

        let req = UpdateMessageRequest {
            subject: "Edited".to_string(),
            content: "Edited".to_string(),
            message_type: MessageType::Email,
            event_id: None,
            scheduled_at: None,
            metadata: serde_json::json!({}),
        };
        assert!(matches!(
            db.update_message(id, owner, &req).unwrap_err(),
            StoreError::CannotModifySent
        ));
        assert!(matches!(
            db.schedule_message(id, owner, Utc::now() + Duration::hours(1)).unwrap_err(),
            StoreError::AlreadySent
        ));
        assert_eq!(db.get_message(id, owner).unwrap().subject, "Hi");
    }

    #[test]
    fn sending_messages_cannot_be_deleted() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();

        // wedge the row into the in-flight state
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET status = 'sending' WHERE id = ?1",
                [id.to_string()],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            db.delete_message(id, owner).unwrap_err(),
            StoreError::CannotDeleteSending
        ));

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET status = 'draft' WHERE id = ?1",
                [id.to_string()],
            )?;
            Ok(())
        })
        .unwrap();
        db.delete_message(id, owner).unwrap();
        assert!(matches!(
            db.get_message(id, owner).unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[test]
    fn schedule_sets_status_and_timestamp() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();

        let when = Utc::now() + Duration::hours(2);
        let scheduled = db.schedule_message(id, owner, when).unwrap();
        assert_eq!(scheduled.status, MessageStatus::Scheduled);
        let stored = scheduled.scheduled_at.unwrap();
        assert!((stored - when).num_milliseconds().abs() < 1);

        // a scheduled message can still be sent
        let r1 = test_util::recipient(&db, owner, "r1@x.com");
        assert_eq!(
            db.send_message(id, owner, &[r1]).unwrap().status,
            MessageStatus::Sent
        );
    }

    #[test]
    fn ownership_enforced_on_message_ops() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let other = test_util::user(&db, "b@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();

        assert!(matches!(
            db.get_message(id, other).unwrap_err(),
            StoreError::AccessDenied
        ));
        assert!(matches!(
            db.delete_message(id, other).unwrap_err(),
            StoreError::AccessDenied
        ));
        assert!(matches!(
            db.send_message(id, other, &[]).unwrap_err(),
            StoreError::AccessDenied
        ));
        assert!(matches!(
            db.list_sends(id, other).unwrap_err(),
            StoreError::AccessDenied
        ));
    }

    #[test]
    fn update_send_status_stamps_and_recounts() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let r1 = test_util::recipient(&db, owner, "r1@x.com");
        let r2 = test_util::recipient(&db, owner, "r2@x.com");
        let id = Uuid::new_v4();
        db.create_message(id, owner, &message_req("Hi")).unwrap();
        db.send_message(id, owner, &[r1, r2]).unwrap();
        let sends = db.list_sends(id, owner).unwrap();

        let delivered = db
            .update_send_status(sends[0].id, owner, SendStatus::Delivered, None)
            .unwrap();
        assert_eq!(delivered.status, SendStatus::Delivered);
        assert!(delivered.delivered_at.is_some());

        let failed = db
            .update_send_status(sends[1].id, owner, SendStatus::Failed, Some("mailbox full"))
            .unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("mailbox full"));

        let message = db.get_message(id, owner).unwrap();
        assert_eq!(message.successful_sends, 1);
        assert_eq!(message.failed_sends, 1);
    }

    #[test]
    fn list_messages_filters_by_status_and_event() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let event_id = Uuid::new_v4();
        db.create_event(event_id, owner, &test_util::event_req("Conf")).unwrap();

        let mut linked = message_req("Linked");
        linked.event_id = Some(event_id);
        db.create_message(Uuid::new_v4(), owner, &linked).unwrap();
        db.create_message(Uuid::new_v4(), owner, &message_req("Loose")).unwrap();

        let (by_event, total) = db
            .list_messages(owner, 1, 10, None, Some(event_id))
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(by_event[0].subject, "Linked");

        let (drafts, drafts_total) = db
            .list_messages(owner, 1, 10, Some(MessageStatus::Draft), None)
            .unwrap();
        assert_eq!(drafts_total, 2);
        assert_eq!(drafts.len(), 2);
    }
}
