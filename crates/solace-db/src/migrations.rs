use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            first_name  TEXT NOT NULL,
            last_name   TEXT NOT NULL,
            role        TEXT NOT NULL CHECK (role IN ('patient', 'therapist')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS therapist_patients (
            id            TEXT PRIMARY KEY,
            therapist_id  TEXT NOT NULL REFERENCES users(id),
            patient_id    TEXT NOT NULL REFERENCES users(id),
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(therapist_id, patient_id)
        );

        CREATE TABLE IF NOT EXISTS mood_entries (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL REFERENCES users(id),
            mood_rating  INTEGER NOT NULL CHECK (mood_rating BETWEEN 1 AND 10),
            notes        TEXT,
            entry_date   TEXT NOT NULL,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_mood_entries_user
            ON mood_entries(user_id, entry_date);

        CREATE TABLE IF NOT EXISTS medications (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL REFERENCES users(id),
            name          TEXT NOT NULL,
            dosage        TEXT,
            frequency     TEXT,
            time_to_take  TEXT NOT NULL DEFAULT '[]',
            notes         TEXT,
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_medications_user
            ON medications(user_id, active);

        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            sender_id     TEXT NOT NULL REFERENCES users(id),
            recipient_id  TEXT NOT NULL REFERENCES users(id),
            content       TEXT NOT NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            read_at       TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_recipient
            ON messages(recipient_id, read_at);

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, recipient_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            type        TEXT NOT NULL,
            title       TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            read_at     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, read_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
