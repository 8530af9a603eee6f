use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use muster_types::api::{CreateRecipientRequest, RecipientStats, UpdateRecipientRequest};
use muster_types::models::Recipient;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{self, RECIPIENT_COLS, recipient_from_row};

fn check_recipient_owner(conn: &Connection, recipient_id: &str, user_id: Uuid) -> StoreResult<()> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT user_id FROM recipients WHERE id = ?1",
            [recipient_id],
            |r| r.get(0),
        )
        .optional()?;
    match owner {
        None => Err(StoreError::NotFound),
        Some(o) if o != user_id.to_string() => Err(StoreError::AccessDenied),
        Some(_) => Ok(()),
    }
}

fn email_taken(conn: &Connection, user_id: &str, email: &str, exclude: Option<&str>) -> StoreResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM recipients WHERE user_id = ?1 AND email = ?2",
            params![user_id, email],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match found {
        Some(id) => exclude != Some(id.as_str()),
        None => false,
    })
}

fn insert_recipient(
    conn: &Connection,
    id: Uuid,
    user_id: &str,
    req: &CreateRecipientRequest,
    now: &str,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO recipients (id, user_id, email, first_name, last_name, phone, company, \
         position, tags, notes, is_active, opt_out, metadata, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, 0, ?11, ?12, ?12)",
        params![
            id.to_string(),
            user_id,
            req.email,
            req.first_name,
            req.last_name,
            req.phone,
            req.company,
            req.position,
            models::json_text(&req.tags)?,
            req.notes,
            models::json_text(&req.metadata)?,
            now
        ],
    )?;
    Ok(())
}

impl Database {
    pub fn create_recipient(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: &CreateRecipientRequest,
    ) -> StoreResult<Recipient> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let uid = user_id.to_string();
            if email_taken(&tx, &uid, &req.email, None)? {
                return Err(StoreError::DuplicateEmail);
            }

            let now = models::ts(Utc::now());
            insert_recipient(&tx, id, &uid, req, &now)?;

            let recipient = tx.query_row(
                &format!("SELECT {RECIPIENT_COLS} FROM recipients WHERE id = ?1"),
                [id.to_string()],
                recipient_from_row,
            )?;
            tx.commit()?;
            Ok(recipient)
        })
    }

    /// Whole-batch import in one transaction. Rows whose email already exists
    /// for this user (or earlier in the same batch) are skipped silently; any
    /// other failure rolls the entire batch back.
    pub fn bulk_create_recipients(
        &self,
        user_id: Uuid,
        reqs: &[CreateRecipientRequest],
    ) -> StoreResult<(usize, usize)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let uid = user_id.to_string();
            let now = models::ts(Utc::now());

            let mut created = 0;
            let mut skipped = 0;
            let mut seen: HashSet<&str> = HashSet::new();

            for req in reqs {
                if !seen.insert(req.email.as_str()) || email_taken(&tx, &uid, &req.email, None)? {
                    skipped += 1;
                    continue;
                }
                insert_recipient(&tx, Uuid::new_v4(), &uid, req, &now)?;
                created += 1;
            }

            tx.commit()?;
            Ok((created, skipped))
        })
    }

    pub fn get_recipient(&self, id: Uuid, user_id: Uuid) -> StoreResult<Recipient> {
        self.with_conn(|conn| {
            let recipient = conn
                .query_row(
                    &format!("SELECT {RECIPIENT_COLS} FROM recipients WHERE id = ?1"),
                    [id.to_string()],
                    recipient_from_row,
                )
                .optional()?;
            match recipient {
                None => Err(StoreError::NotFound),
                Some(r) if r.user_id != user_id => Err(StoreError::AccessDenied),
                Some(r) => Ok(r),
            }
        })
    }

    pub fn list_recipients(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
        is_active: Option<bool>,
    ) -> StoreResult<(Vec<Recipient>, i64)> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page as u64 - 1) * limit as u64;

        self.with_conn(|conn| {
            let uid = user_id.to_string();
            let mut where_sql = String::from("user_id = ?1");
            let mut sql_params: Vec<&dyn rusqlite::types::ToSql> = vec![&uid];
            let active = is_active;
            if let Some(ref a) = active {
                where_sql.push_str(" AND is_active = ?2");
                sql_params.push(a);
            }

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM recipients WHERE {where_sql}"),
                sql_params.as_slice(),
                |r| r.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {RECIPIENT_COLS} FROM recipients WHERE {where_sql} \
                 ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}"
            ))?;
            let recipients = stmt
                .query_map(sql_params.as_slice(), recipient_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok((recipients, total))
        })
    }

    /// Full-row replacement. An email change re-checks uniqueness against the
    /// owner's other recipients.
    pub fn update_recipient(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: &UpdateRecipientRequest,
    ) -> StoreResult<Recipient> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let rid = id.to_string();
            check_recipient_owner(&tx, &rid, user_id)?;

            if email_taken(&tx, &user_id.to_string(), &req.email, Some(&rid))? {
                return Err(StoreError::DuplicateEmail);
            }

            tx.execute(
                "UPDATE recipients SET email = ?1, first_name = ?2, last_name = ?3, \
                 phone = ?4, company = ?5, position = ?6, tags = ?7, notes = ?8, \
                 is_active = ?9, metadata = ?10, updated_at = ?11 WHERE id = ?12",
                params![
                    req.email,
                    req.first_name,
                    req.last_name,
                    req.phone,
                    req.company,
                    req.position,
                    models::json_text(&req.tags)?,
                    req.notes,
                    req.is_active,
                    models::json_text(&req.metadata)?,
                    models::ts(Utc::now()),
                    rid
                ],
            )?;

            let recipient = tx.query_row(
                &format!("SELECT {RECIPIENT_COLS} FROM recipients WHERE id = ?1"),
                [rid],
                recipient_from_row,
            )?;
            tx.commit()?;
            Ok(recipient)
        })
    }

    pub fn delete_recipient(&self, id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let rid = id.to_string();
            check_recipient_owner(&tx, &rid, user_id)?;

            // participant rows cascade away, so the affected events need their
            // derived counters refreshed afterwards
            let mut stmt = tx.prepare(
                "SELECT DISTINCT event_id FROM event_participants WHERE recipient_id = ?1",
            )?;
            let affected: Vec<String> = stmt
                .query_map([&rid], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);

            tx.execute("DELETE FROM recipients WHERE id = ?1", [&rid])?;

            for event_id in &affected {
                tx.execute(
                    "UPDATE events SET current_participants = (
                         SELECT COUNT(*) FROM event_participants
                         WHERE event_id = ?1 AND status IN ('confirmed', 'attended')
                     ) WHERE id = ?1",
                    [event_id],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Toggle the opt-out flag, stamping or clearing the date. Does not touch
    /// `is_active`.
    pub fn set_opt_out(&self, id: Uuid, user_id: Uuid, opt_out: bool) -> StoreResult<Recipient> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let rid = id.to_string();
            check_recipient_owner(&tx, &rid, user_id)?;

            let opt_out_date = opt_out.then(|| models::ts(Utc::now()));
            tx.execute(
                "UPDATE recipients SET opt_out = ?1, opt_out_date = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![opt_out, opt_out_date, models::ts(Utc::now()), rid],
            )?;

            let recipient = tx.query_row(
                &format!("SELECT {RECIPIENT_COLS} FROM recipients WHERE id = ?1"),
                [rid],
                recipient_from_row,
            )?;
            tx.commit()?;
            Ok(recipient)
        })
    }

    /// Case-insensitive substring match over contact fields plus exact tag
    /// membership. Inactive recipients are never searched.
    pub fn search_recipients(&self, user_id: Uuid, term: &str) -> StoreResult<Vec<Recipient>> {
        self.with_conn(|conn| {
            let pattern = format!("%{}%", term.to_lowercase());
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECIPIENT_COLS} FROM recipients \
                 WHERE user_id = ?1 AND is_active = 1 AND ( \
                     LOWER(email) LIKE ?2 \
                     OR LOWER(COALESCE(first_name, '')) LIKE ?2 \
                     OR LOWER(COALESCE(last_name, '')) LIKE ?2 \
                     OR LOWER(COALESCE(company, '')) LIKE ?2 \
                     OR LOWER(COALESCE(position, '')) LIKE ?2 \
                     OR EXISTS (SELECT 1 FROM json_each(recipients.tags) \
                                WHERE json_each.value = ?3) \
                 ) ORDER BY created_at DESC"
            ))?;
            let recipients = stmt
                .query_map(params![user_id.to_string(), pattern, term], recipient_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(recipients)
        })
    }

    /// Distinct tags across the owner's active recipients, sorted.
    pub fn all_recipient_tags(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT je.value FROM recipients r, json_each(r.tags) je \
                 WHERE r.user_id = ?1 AND r.is_active = 1 ORDER BY je.value",
            )?;
            let tags = stmt
                .query_map([user_id.to_string()], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }

    pub fn recipient_stats(&self, user_id: Uuid) -> StoreResult<RecipientStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT COUNT(*), \
                     COALESCE(SUM(is_active), 0), \
                     COALESCE(SUM(opt_out), 0), \
                     COALESCE(SUM(CASE WHEN company IS NOT NULL AND company != '' \
                         THEN 1 ELSE 0 END), 0) \
                 FROM recipients WHERE user_id = ?1",
                [user_id.to_string()],
                |r| {
                    Ok(RecipientStats {
                        total: r.get(0)?,
                        active: r.get(1)?,
                        opted_out: r.get(2)?,
                        with_company: r.get(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use muster_types::models::ParticipantStatus;

    fn update_req_from(r: &Recipient) -> UpdateRecipientRequest {
        UpdateRecipientRequest {
            email: r.email.clone(),
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            phone: r.phone.clone(),
            company: r.company.clone(),
            position: r.position.clone(),
            tags: r.tags.clone(),
            notes: r.notes.clone(),
            is_active: r.is_active,
            metadata: r.metadata.clone(),
        }
    }

    #[test]
    fn email_unique_per_owner_not_globally() {
        let db = test_util::db();
        let alice = test_util::user(&db, "a@x.com");
        let beth = test_util::user(&db, "b@x.com");

        db.create_recipient(Uuid::new_v4(), alice, &test_util::recipient_req("bob@x.com"))
            .unwrap();
        let err = db
            .create_recipient(Uuid::new_v4(), alice, &test_util::recipient_req("bob@x.com"))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));

        // same address under a different owner is fine
        db.create_recipient(Uuid::new_v4(), beth, &test_util::recipient_req("bob@x.com"))
            .unwrap();
    }

    #[test]
    fn bulk_import_skips_existing_and_batch_duplicates() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        db.create_recipient(Uuid::new_v4(), owner, &test_util::recipient_req("bob@x.com"))
            .unwrap();

        let batch = vec![
            test_util::recipient_req("bob@x.com"),
            test_util::recipient_req("carol@x.com"),
            test_util::recipient_req("carol@x.com"),
            test_util::recipient_req("dave@x.com"),
        ];
        let (created, skipped) = db.bulk_create_recipients(owner, &batch).unwrap();
        assert_eq!(created, 2);
        assert_eq!(skipped, 2);

        let (all, total) = db.list_recipients(owner, 1, 10, None).unwrap();
        assert_eq!(total, 3);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn update_rechecks_email_uniqueness_excluding_self() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let bob = db
            .create_recipient(Uuid::new_v4(), owner, &test_util::recipient_req("bob@x.com"))
            .unwrap();
        db.create_recipient(Uuid::new_v4(), owner, &test_util::recipient_req("carol@x.com"))
            .unwrap();

        // keeping its own email is not a conflict
        let mut req = update_req_from(&bob);
        req.first_name = Some("Bob".to_string());
        let updated = db.update_recipient(bob.id, owner, &req).unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Bob"));

        // taking another recipient's email is
        let mut steal = update_req_from(&bob);
        steal.email = "carol@x.com".to_string();
        assert!(matches!(
            db.update_recipient(bob.id, owner, &steal).unwrap_err(),
            StoreError::DuplicateEmail
        ));
    }

    #[test]
    fn ownership_enforced_on_mutations() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let other = test_util::user(&db, "b@x.com");
        let bob = db
            .create_recipient(Uuid::new_v4(), owner, &test_util::recipient_req("bob@x.com"))
            .unwrap();

        let req = update_req_from(&bob);
        assert!(matches!(
            db.update_recipient(bob.id, other, &req).unwrap_err(),
            StoreError::AccessDenied
        ));
        assert!(matches!(
            db.delete_recipient(bob.id, other).unwrap_err(),
            StoreError::AccessDenied
        ));
        assert!(matches!(
            db.get_recipient(bob.id, other).unwrap_err(),
            StoreError::AccessDenied
        ));
        assert_eq!(db.get_recipient(bob.id, owner).unwrap().email, "bob@x.com");
    }

    #[test]
    fn opt_out_stamps_date_and_opt_in_clears_it() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let bob = db
            .create_recipient(Uuid::new_v4(), owner, &test_util::recipient_req("bob@x.com"))
            .unwrap();

        let out = db.set_opt_out(bob.id, owner, true).unwrap();
        assert!(out.opt_out);
        assert!(out.opt_out_date.is_some());
        assert!(out.is_active);

        let back = db.set_opt_out(bob.id, owner, false).unwrap();
        assert!(!back.opt_out);
        assert!(back.opt_out_date.is_none());
    }

    #[test]
    fn search_covers_fields_tags_and_skips_inactive() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");

        let mut req = test_util::recipient_req("bob@corp.com");
        req.company = Some("Acme Corp".to_string());
        req.tags = vec!["vip".to_string()];
        let bob = db.create_recipient(Uuid::new_v4(), owner, &req).unwrap();

        assert_eq!(db.search_recipients(owner, "acme").unwrap().len(), 1);
        assert_eq!(db.search_recipients(owner, "vip").unwrap().len(), 1);
        assert_eq!(db.search_recipients(owner, "vi").unwrap().len(), 0);

        let mut deactivate = update_req_from(&bob);
        deactivate.is_active = false;
        db.update_recipient(bob.id, owner, &deactivate).unwrap();
        assert!(db.search_recipients(owner, "acme").unwrap().is_empty());
    }

    #[test]
    fn tags_are_distinct_and_sorted() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");

        let mut a = test_util::recipient_req("a@x.com");
        a.tags = vec!["vip".to_string(), "beta".to_string()];
        db.create_recipient(Uuid::new_v4(), owner, &a).unwrap();

        let mut b = test_util::recipient_req("b@x.com");
        b.tags = vec!["vip".to_string(), "alpha".to_string()];
        db.create_recipient(Uuid::new_v4(), owner, &b).unwrap();

        assert_eq!(db.all_recipient_tags(owner).unwrap(), vec!["alpha", "beta", "vip"]);
    }

    #[test]
    fn stats_count_buckets() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");

        let mut with_company = test_util::recipient_req("a@x.com");
        with_company.company = Some("Acme".to_string());
        db.create_recipient(Uuid::new_v4(), owner, &with_company).unwrap();

        let bob = db
            .create_recipient(Uuid::new_v4(), owner, &test_util::recipient_req("b@x.com"))
            .unwrap();
        db.set_opt_out(bob.id, owner, true).unwrap();

        let stats = db.recipient_stats(owner).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.opted_out, 1);
        assert_eq!(stats.with_company, 1);
    }

    #[test]
    fn delete_refreshes_event_counters() {
        let db = test_util::db();
        let owner = test_util::user(&db, "a@x.com");
        let event_id = Uuid::new_v4();
        db.create_event(event_id, owner, &test_util::event_req("Conf")).unwrap();

        let bob = test_util::recipient(&db, owner, "bob@x.com");
        db.add_participant(Uuid::new_v4(), event_id, bob, owner, ParticipantStatus::Confirmed, None)
            .unwrap();
        assert_eq!(db.get_event(event_id, owner).unwrap().current_participants, 1);

        db.delete_recipient(bob, owner).unwrap();
        assert_eq!(db.get_event(event_id, owner).unwrap().current_participants, 0);
    }
}
