use rusqlite::Connection;
use tracing::info;

use crate::error::StoreResult;

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            first_name      TEXT NOT NULL DEFAULT '',
            last_name       TEXT NOT NULL DEFAULT '',
            company_name    TEXT NOT NULL DEFAULT '',
            is_active       INTEGER NOT NULL DEFAULT 1,
            email_verified  INTEGER NOT NULL DEFAULT 0,
            last_login_at   TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id                    TEXT PRIMARY KEY,
            user_id               TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title                 TEXT NOT NULL,
            description           TEXT,
            event_date            TEXT NOT NULL,
            location              TEXT,
            status                TEXT NOT NULL DEFAULT 'draft',
            max_participants      INTEGER,
            current_participants  INTEGER NOT NULL DEFAULT 0,
            is_public             INTEGER NOT NULL DEFAULT 0,
            registration_deadline TEXT,
            tags                  TEXT NOT NULL DEFAULT '[]',
            metadata              TEXT NOT NULL DEFAULT '{}',
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_user
            ON events(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_date
            ON events(event_date);

        CREATE TABLE IF NOT EXISTS recipients (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            email         TEXT NOT NULL,
            first_name    TEXT,
            last_name     TEXT,
            phone         TEXT,
            company       TEXT,
            position      TEXT,
            tags          TEXT NOT NULL DEFAULT '[]',
            notes         TEXT,
            is_active     INTEGER NOT NULL DEFAULT 1,
            opt_out       INTEGER NOT NULL DEFAULT 0,
            opt_out_date  TEXT,
            metadata      TEXT NOT NULL DEFAULT '{}',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            UNIQUE(user_id, email)
        );

        CREATE TABLE IF NOT EXISTS event_participants (
            id            TEXT PRIMARY KEY,
            event_id      TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            recipient_id  TEXT NOT NULL REFERENCES recipients(id) ON DELETE CASCADE,
            status        TEXT NOT NULL DEFAULT 'invited',
            invited_at    TEXT NOT NULL,
            responded_at  TEXT,
            attended_at   TEXT,
            notes         TEXT,
            UNIQUE(event_id, recipient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_event
            ON event_participants(event_id);

        CREATE TABLE IF NOT EXISTS messages (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            event_id          TEXT REFERENCES events(id) ON DELETE SET NULL,
            subject           TEXT NOT NULL,
            content           TEXT NOT NULL,
            message_type      TEXT NOT NULL DEFAULT 'email',
            status            TEXT NOT NULL DEFAULT 'draft',
            scheduled_at      TEXT,
            sent_at           TEXT,
            total_recipients  INTEGER NOT NULL DEFAULT 0,
            successful_sends  INTEGER NOT NULL DEFAULT 0,
            failed_sends      INTEGER NOT NULL DEFAULT 0,
            metadata          TEXT NOT NULL DEFAULT '{}',
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_user
            ON messages(user_id, created_at);

        -- recipient_id goes null on contact deletion; the denormalized email
        -- keeps delivery history intact.
        CREATE TABLE IF NOT EXISTS message_sends (
            id               TEXT PRIMARY KEY,
            message_id       TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            recipient_id     TEXT REFERENCES recipients(id) ON DELETE SET NULL,
            recipient_email  TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'pending',
            sent_at          TEXT,
            delivered_at     TEXT,
            read_at          TEXT,
            error_message    TEXT,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sends_message
            ON message_sends(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
