use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use muster_types::api::{CreateEventRequest, EventStats, UpdateEventRequest};
use muster_types::models::{Event, EventStatus, Participant, ParticipantStatus};

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{self, EVENT_COLS, PARTICIPANT_COLS, event_from_row, participant_from_row};

/// NotFound when the event does not exist, AccessDenied when it belongs to
/// someone else.
fn check_event_owner(conn: &Connection, event_id: &str, user_id: Uuid) -> StoreResult<()> {
    let owner: Option<String> = conn
        .query_row("SELECT user_id FROM events WHERE id = ?1", [event_id], |r| r.get(0))
        .optional()?;
    match owner {
        None => Err(StoreError::NotFound),
        Some(o) if o != user_id.to_string() => Err(StoreError::AccessDenied),
        Some(_) => Ok(()),
    }
}

/// The derived participant total: confirmed + attended rows only.
fn recount_participants(conn: &Connection, event_id: &str) -> StoreResult<()> {
    conn.execute(
        "UPDATE events SET current_participants = (
             SELECT COUNT(*) FROM event_participants
             WHERE event_id = ?1 AND status IN ('confirmed', 'attended')
         ) WHERE id = ?1",
        [event_id],
    )?;
    Ok(())
}

impl Database {
    pub fn create_event(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: &CreateEventRequest,
    ) -> StoreResult<Event> {
        self.with_conn(|conn| {
            let now = models::ts(Utc::now());
            let status = req.status.unwrap_or(EventStatus::Draft);
            conn.execute(
                "INSERT INTO events (id, user_id, title, description, event_date, location, \
                 status, max_participants, current_participants, is_public, \
                 registration_deadline, tags, metadata, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    id.to_string(),
                    user_id.to_string(),
                    req.title,
                    req.description,
                    models::ts(req.event_date),
                    req.location,
                    status.as_str(),
                    req.max_participants,
                    req.is_public,
                    models::opt_ts(req.registration_deadline),
                    models::json_text(&req.tags)?,
                    models::json_text(&req.metadata)?,
                    now
                ],
            )?;
            let event = conn.query_row(
                &format!("SELECT {EVENT_COLS} FROM events WHERE id = ?1"),
                [id.to_string()],
                event_from_row,
            )?;
            Ok(event)
        })
    }

    pub fn get_event(&self, id: Uuid, user_id: Uuid) -> StoreResult<Event> {
        self.with_conn(|conn| {
            let event = conn
                .query_row(
                    &format!("SELECT {EVENT_COLS} FROM events WHERE id = ?1"),
                    [id.to_string()],
                    event_from_row,
                )
                .optional()?;
            match event {
                None => Err(StoreError::NotFound),
                Some(e) if e.user_id != user_id => Err(StoreError::AccessDenied),
                Some(e) => Ok(e),
            }
        })
    }

    pub fn list_events(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
        status: Option<EventStatus>,
        sort_by: Option<&str>,
        sort_order: Option<&str>,
    ) -> StoreResult<(Vec<Event>, i64)> {
        // Caller-controlled sort never reaches the SQL text unchecked.
        let sort_col = match sort_by {
            Some("event_date") => "event_date",
            Some("title") => "title",
            Some("status") => "status",
            _ => "created_at",
        };
        let dir = match sort_order {
            Some(o) if o.eq_ignore_ascii_case("asc") => "ASC",
            _ => "DESC",
        };
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page as u64 - 1) * limit as u64;

        self.with_conn(|conn| {
            let uid = user_id.to_string();
            let st = status.map(|s| s.as_str().to_string());

            let mut where_sql = String::from("user_id = ?1");
            let mut sql_params: Vec<&dyn rusqlite::types::ToSql> = vec![&uid];
            if let Some(ref s) = st {
                where_sql.push_str(" AND status = ?2");
                sql_params.push(s);
            }

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM events WHERE {where_sql}"),
                sql_params.as_slice(),
                |r| r.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLS} FROM events WHERE {where_sql} \
                 ORDER BY {sort_col} {dir} LIMIT {limit} OFFSET {offset}"
            ))?;
            let events = stmt
                .query_map(sql_params.as_slice(), event_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok((events, total))
        })
    }

    /// Full-row replacement of the mutable fields.
    pub fn update_event(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: &UpdateEventRequest,
    ) -> StoreResult<Event> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let eid = id.to_string();
            check_event_owner(&tx, &eid, user_id)?;

            tx.execute(
                "UPDATE events SET title = ?1, description = ?2, event_date = ?3, \
                 location = ?4, status = ?5, max_participants = ?6, is_public = ?7, \
                 registration_deadline = ?8, tags = ?9, metadata = ?10, updated_at = ?11 \
                 WHERE id = ?12",
                params![
                    req.title,
                    req.description,
                    models::ts(req.event_date),
                    req.location,
                    req.status.as_str(),
                    req.max_participants,
                    req.is_public,
                    models::opt_ts(req.registration_deadline),
                    models::json_text(&req.tags)?,
                    models::json_text(&req.metadata)?,
                    models::ts(Utc::now()),
                    eid
                ],
            )?;

            let event = tx.query_row(
                &format!("SELECT {EVENT_COLS} FROM events WHERE id = ?1"),
                [eid],
                event_from_row,
            )?;
            tx.commit()?;
            Ok(event)
        })
    }

    pub fn delete_event(&self, id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let eid = id.to_string();
            check_event_owner(&tx, &eid, user_id)?;
            // participant rows go with the event via ON DELETE CASCADE
            tx.execute("DELETE FROM events WHERE id = ?1", [eid])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Upsert on the (event, recipient) pair: a second add updates the status
    /// and re-stamps the invite time instead of duplicating the row.
    pub fn add_participant(
        &self,
        participant_id: Uuid,
        event_id: Uuid,
        recipient_id: Uuid,
        user_id: Uuid,
        status: ParticipantStatus,
        notes: Option<&str>,
    ) -> StoreResult<Participant> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let eid = event_id.to_string();
            let rid = recipient_id.to_string();
            check_event_owner(&tx, &eid, user_id)?;

            // participants must come from the caller's own directory
            let recipient_owner: Option<String> = tx
                .query_row("SELECT user_id FROM recipients WHERE id = ?1", [&rid], |r| r.get(0))
                .optional()?;
            match recipient_owner {
                None => return Err(StoreError::NotFound),
                Some(o) if o != user_id.to_string() => return Err(StoreError::AccessDenied),
                Some(_) => {}
            }

            let now = models::ts(Utc::now());
            let responded_at = matches!(
                status,
                ParticipantStatus::Confirmed | ParticipantStatus::Declined
            )
            .then(|| now.clone());
            let attended_at =
                matches!(status, ParticipantStatus::Attended).then(|| now.clone());

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM event_participants WHERE event_id = ?1 AND recipient_id = ?2",
                    params![eid, rid],
                    |r| r.get(0),
                )
                .optional()?;

            let row_id = match existing {
                Some(existing_id) => {
                    tx.execute(
                        "UPDATE event_participants SET status = ?1, invited_at = ?2, \
                         responded_at = ?3, attended_at = ?4, notes = ?5 WHERE id = ?6",
                        params![status.as_str(), now, responded_at, attended_at, notes, existing_id],
                    )?;
                    existing_id
                }
                None => {
                    tx.execute(
                        "INSERT INTO event_participants (id, event_id, recipient_id, status, \
                         invited_at, responded_at, attended_at, notes) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            participant_id.to_string(),
                            eid,
                            rid,
                            status.as_str(),
                            now,
                            responded_at,
                            attended_at,
                            notes
                        ],
                    )?;
                    participant_id.to_string()
                }
            };

            recount_participants(&tx, &eid)?;

            let participant = tx.query_row(
                &format!("SELECT {PARTICIPANT_COLS} FROM event_participants WHERE id = ?1"),
                [row_id],
                participant_from_row,
            )?;
            tx.commit()?;
            Ok(participant)
        })
    }

    pub fn remove_participant(
        &self,
        event_id: Uuid,
        recipient_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let eid = event_id.to_string();
            check_event_owner(&tx, &eid, user_id)?;

            let removed = tx.execute(
                "DELETE FROM event_participants WHERE event_id = ?1 AND recipient_id = ?2",
                params![eid, recipient_id.to_string()],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound);
            }

            recount_participants(&tx, &eid)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_participants(&self, event_id: Uuid, user_id: Uuid) -> StoreResult<Vec<Participant>> {
        self.with_conn(|conn| {
            let eid = event_id.to_string();
            check_event_owner(conn, &eid, user_id)?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {PARTICIPANT_COLS} FROM event_participants \
                 WHERE event_id = ?1 ORDER BY invited_at"
            ))?;
            let participants = stmt
                .query_map([eid], participant_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(participants)
        })
    }

    /// Case-insensitive substring match over title/description/location plus
    /// exact tag membership.
    pub fn search_events(&self, user_id: Uuid, term: &str) -> StoreResult<Vec<Event>> {
        self.with_conn(|conn| {
            let pattern = format!("%{}%", term.to_lowercase());
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLS} FROM events \
                 WHERE user_id = ?1 AND ( \
                     LOWER(title) LIKE ?2 \
                     OR LOWER(COALESCE(description, '')) LIKE ?2 \
                     OR LOWER(COALESCE(location, '')) LIKE ?2 \
                     OR EXISTS (SELECT 1 FROM json_each(events.tags) \
                                WHERE json_each.value = ?3) \
                 ) ORDER BY created_at DESC"
            ))?;
            let events = stmt
                .query_map(params![user_id.to_string(), pattern, term], event_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
    }

    pub fn upcoming_events(&self, user_id: Uuid, limit: u32) -> StoreResult<Vec<Event>> {
        let limit = limit.clamp(1, 100);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLS} FROM events \
                 WHERE user_id = ?1 AND status = 'active' AND event_date > ?2 \
                 ORDER BY event_date ASC LIMIT {limit}"
            ))?;
            let events = stmt
                .query_map(
                    params![user_id.to_string(), models::ts(Utc::now())],
                    event_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
    }

    pub fn event_stats(&self, user_id: Uuid) -> StoreResult<EventStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT COUNT(*), \
                     COALESCE(SUM(CASE WHEN status = 'draft' THEN 1 ELSE 0 END), 0), \
                     COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0), \
                     COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0), \
                     COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0), \
                     COALESCE(SUM(CASE WHEN status = 'active' AND event_date > ?2 \
                         THEN 1 ELSE 0 END), 0), \
                     COALESCE(SUM(current_participants), 0) \
                 FROM events WHERE user_id = ?1",
                params![user_id.to_string(), models::ts(Utc::now())],
                |r| {
                    Ok(EventStats {
                        total: r.get(0)?,
                        draft: r.get(1)?,
                        active: r.get(2)?,
                        completed: r.get(3)?,
                        cancelled: r.get(4)?,
                        upcoming: r.get(5)?,
                        total_participants: r.get(6)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::test_util::{self, event_req};

    fn update_req_from(event: &Event) -> UpdateEventRequest {
        UpdateEventRequest {
            title: event.title.clone(),
            description: event.description.clone(),
            event_date: event.event_date,
            location: event.location.clone(),
            status: event.status,
            max_participants: event.max_participants,
            is_public: event.is_public,
            registration_deadline: event.registration_deadline,
            tags: event.tags.clone(),
            metadata: event.metadata.clone(),
        }
    }

    #[test]
    fn create_then_get_round_trip() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let mut req = event_req("Launch");
        req.description = Some("Product launch".to_string());
        req.tags = vec!["launch".to_string(), "q3".to_string()];

        let id = Uuid::new_v4();
        db.create_event(id, owner, &req).unwrap();
        let event = db.get_event(id, owner).unwrap();

        assert_eq!(event.title, "Launch");
        assert_eq!(event.description.as_deref(), Some("Product launch"));
        assert_eq!(event.event_date, req.event_date);
        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(event.current_participants, 0);
        assert!(!event.is_public);
        assert_eq!(event.tags, vec!["launch", "q3"]);
    }

    #[test]
    fn get_distinguishes_missing_from_foreign() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let other = test_util::user(&db, "b@x.com");
        let id = Uuid::new_v4();
        db.create_event(id, owner, &event_req("Conf")).unwrap();

        assert!(matches!(
            db.get_event(Uuid::new_v4(), owner).unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(
            db.get_event(id, other).unwrap_err(),
            StoreError::AccessDenied
        ));
    }

    #[test]
    fn update_and_delete_enforce_ownership() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let other = test_util::user(&db, "b@x.com");
        let id = Uuid::new_v4();
        let event = db.create_event(id, owner, &event_req("Conf")).unwrap();

        let mut req = update_req_from(&event);
        req.title = "Hijacked".to_string();
        assert!(matches!(
            db.update_event(id, other, &req).unwrap_err(),
            StoreError::AccessDenied
        ));
        assert!(matches!(
            db.delete_event(id, other).unwrap_err(),
            StoreError::AccessDenied
        ));

        // the row is untouched
        let unchanged = db.get_event(id, owner).unwrap();
        assert_eq!(unchanged.title, "Conf");
    }

    #[test]
    fn update_replaces_all_mutable_fields() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let id = Uuid::new_v4();
        let event = db.create_event(id, owner, &event_req("Conf")).unwrap();

        let mut req = update_req_from(&event);
        req.title = "Conference".to_string();
        req.status = EventStatus::Active;
        req.location = Some("Berlin".to_string());
        req.max_participants = Some(50);
        let updated = db.update_event(id, owner, &req).unwrap();

        assert_eq!(updated.title, "Conference");
        assert_eq!(updated.status, EventStatus::Active);
        assert_eq!(updated.location.as_deref(), Some("Berlin"));
        assert_eq!(updated.max_participants, Some(50));
        assert!(updated.updated_at >= event.updated_at);
    }

    #[test]
    fn delete_cascades_participant_rows() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let event_id = Uuid::new_v4();
        db.create_event(event_id, owner, &event_req("Conf")).unwrap();
        let r = test_util::recipient(&db, owner, "bob@x.com");
        db.add_participant(Uuid::new_v4(), event_id, r, owner, ParticipantStatus::Invited, None)
            .unwrap();

        db.delete_event(event_id, owner).unwrap();

        let remaining: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM event_participants WHERE event_id = ?1",
                    [event_id.to_string()],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn participant_upsert_is_idempotent() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let event_id = Uuid::new_v4();
        db.create_event(event_id, owner, &event_req("Conf")).unwrap();
        let r = test_util::recipient(&db, owner, "bob@x.com");

        db.add_participant(Uuid::new_v4(), event_id, r, owner, ParticipantStatus::Confirmed, None)
            .unwrap();
        db.add_participant(Uuid::new_v4(), event_id, r, owner, ParticipantStatus::Confirmed, None)
            .unwrap();

        let participants = db.get_participants(event_id, owner).unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].status, ParticipantStatus::Confirmed);
        assert_eq!(db.get_event(event_id, owner).unwrap().current_participants, 1);
    }

    #[test]
    fn participant_counter_counts_confirmed_and_attended_only() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let event_id = Uuid::new_v4();
        db.create_event(event_id, owner, &event_req("Conf")).unwrap();
        let r1 = test_util::recipient(&db, owner, "r1@x.com");
        let r2 = test_util::recipient(&db, owner, "r2@x.com");
        let r3 = test_util::recipient(&db, owner, "r3@x.com");

        db.add_participant(Uuid::new_v4(), event_id, r1, owner, ParticipantStatus::Confirmed, None)
            .unwrap();
        db.add_participant(Uuid::new_v4(), event_id, r2, owner, ParticipantStatus::Invited, None)
            .unwrap();
        db.add_participant(Uuid::new_v4(), event_id, r3, owner, ParticipantStatus::Attended, None)
            .unwrap();
        assert_eq!(db.get_event(event_id, owner).unwrap().current_participants, 2);

        db.remove_participant(event_id, r3, owner).unwrap();
        assert_eq!(db.get_event(event_id, owner).unwrap().current_participants, 1);
    }

    #[test]
    fn participants_must_come_from_own_directory() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let other = test_util::user(&db, "b@x.com");
        let event_id = Uuid::new_v4();
        db.create_event(event_id, owner, &event_req("Conf")).unwrap();
        let foreign = test_util::recipient(&db, other, "bob@x.com");

        assert!(matches!(
            db.add_participant(
                Uuid::new_v4(),
                event_id,
                foreign,
                owner,
                ParticipantStatus::Invited,
                None
            )
            .unwrap_err(),
            StoreError::AccessDenied
        ));
    }

    #[test]
    fn list_filters_paginates_and_counts() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        for i in 0..3 {
            let mut req = event_req(&format!("Event {i}"));
            req.status = Some(if i == 0 { EventStatus::Active } else { EventStatus::Draft });
            db.create_event(Uuid::new_v4(), owner, &req).unwrap();
        }

        let (all, total) = db.list_events(owner, 1, 2, None, None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(total, 3);

        let (active, active_total) = db
            .list_events(owner, 1, 10, Some(EventStatus::Active), None, None)
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active_total, 1);

        // another tenant sees nothing
        let stranger = test_util::user(&db, "b@x.com");
        let (none, zero) = db.list_events(stranger, 1, 10, None, None, None).unwrap();
        assert!(none.is_empty());
        assert_eq!(zero, 0);
    }

    #[test]
    fn list_sort_column_is_whitelisted() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        for title in ["b", "a", "c"] {
            db.create_event(Uuid::new_v4(), owner, &event_req(title)).unwrap();
        }

        let (sorted, _) = db
            .list_events(owner, 1, 10, None, Some("title"), Some("asc"))
            .unwrap();
        let titles: Vec<_> = sorted.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);

        // a hostile sort key falls back to the default column instead of
        // reaching the SQL text
        let (fallback, _) = db
            .list_events(owner, 1, 10, None, Some("title; DROP TABLE events"), None)
            .unwrap();
        assert_eq!(fallback.len(), 3);
    }

    #[test]
    fn search_matches_fields_and_exact_tags() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");

        let mut req = event_req("Annual Summit");
        req.location = Some("Lisbon".to_string());
        db.create_event(Uuid::new_v4(), owner, &req).unwrap();

        let mut tagged = event_req("Offsite");
        tagged.tags = vec!["team".to_string()];
        db.create_event(Uuid::new_v4(), owner, &tagged).unwrap();

        assert_eq!(db.search_events(owner, "summit").unwrap().len(), 1);
        assert_eq!(db.search_events(owner, "lisbon").unwrap().len(), 1);
        assert_eq!(db.search_events(owner, "team").unwrap().len(), 1);
        // substring of a tag is not membership
        assert_eq!(db.search_events(owner, "tea").unwrap().len(), 0);
    }

    #[test]
    fn upcoming_requires_active_and_future() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");

        let mut active = event_req("Soon");
        active.status = Some(EventStatus::Active);
        db.create_event(Uuid::new_v4(), owner, &active).unwrap();

        let mut draft = event_req("Draft");
        draft.event_date = Utc::now() + Duration::days(1);
        db.create_event(Uuid::new_v4(), owner, &draft).unwrap();

        let upcoming = db.upcoming_events(owner, 10).unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "Soon");
    }

    #[test]
    fn stats_aggregate_by_status() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");

        let mut active = event_req("A");
        active.status = Some(EventStatus::Active);
        db.create_event(Uuid::new_v4(), owner, &active).unwrap();
        db.create_event(Uuid::new_v4(), owner, &event_req("B")).unwrap();

        let stats = db.event_stats(owner).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.draft, 1);
        assert_eq!(stats.upcoming, 1);
        assert_eq!(stats.total_participants, 0);
    }

    /// The end-to-end flow: event, contact, invite, confirm.
    #[test]
    fn invite_then_confirm_scenario() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");

        let event_id = Uuid::new_v4();
        db.create_event(event_id, owner, &event_req("Conf")).unwrap();
        assert_eq!(db.get_event(event_id, owner).unwrap().status, EventStatus::Draft);

        let bob = test_util::recipient(&db, owner, "bob@x.com");
        db.add_participant(Uuid::new_v4(), event_id, bob, owner, ParticipantStatus::Invited, None)
            .unwrap();

        assert_eq!(db.get_participants(event_id, owner).unwrap().len(), 1);
        assert_eq!(db.get_event(event_id, owner).unwrap().current_participants, 0);

        let confirmed = db
            .add_participant(Uuid::new_v4(), event_id, bob, owner, ParticipantStatus::Confirmed, None)
            .unwrap();
        assert_eq!(confirmed.status, ParticipantStatus::Confirmed);
        assert!(confirmed.responded_at.is_some());
        assert_eq!(db.get_event(event_id, owner).unwrap().current_participants, 1);
    }
}
