//! Database row types — these map directly to SQLite rows.
//! Distinct from the solace-types API models to keep the DB layer
//! independent; the `into_*` conversions parse the TEXT columns and
//! warn (rather than fail) on corrupt values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use solace_types::models::{
    Medication, Message, MoodEntry, Notification, NotificationKind, Role, User,
};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub created_at: String,
}

pub struct RelationshipRow {
    pub id: String,
    pub therapist_id: String,
    pub patient_id: String,
    pub created_at: String,
}

pub struct MoodEntryRow {
    pub id: String,
    pub user_id: String,
    pub mood_rating: i64,
    pub notes: Option<String>,
    pub entry_date: String,
    pub created_at: String,
}

pub struct MedicationRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    /// JSON-encoded array of "HH:MM" strings.
    pub time_to_take: String,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub created_at: String,
    pub read_at: Option<String>,
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub sender_role: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

/// One aggregated conversation row, derived from the messages scan.
pub struct ConversationRow {
    pub other_user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub last_message: String,
    pub last_message_time: String,
    pub unread_count: i64,
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Try RFC 3339 first, then parse as naive UTC and convert.
pub fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}

pub fn parse_id(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' on {}: {}", raw, context, e);
        Uuid::default()
    })
}

fn parse_role(raw: &str, context: &str) -> Role {
    raw.parse().unwrap_or_else(|e| {
        warn!("{} on {}", e, context);
        Role::Patient
    })
}

fn parse_date(raw: &str, context: &str) -> NaiveDate {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt date '{}' on {}: {}", raw, context, e);
        NaiveDate::default()
    })
}

impl UserRow {
    pub fn into_user(self) -> User {
        let ctx = format!("user '{}'", self.id);
        User {
            id: parse_id(&self.id, &ctx),
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role: parse_role(&self.role, &ctx),
            created_at: parse_timestamp(&self.created_at, &ctx),
        }
    }
}

impl MoodEntryRow {
    pub fn into_entry(self) -> MoodEntry {
        let ctx = format!("mood entry '{}'", self.id);
        MoodEntry {
            id: parse_id(&self.id, &ctx),
            user_id: parse_id(&self.user_id, &ctx),
            mood_rating: self.mood_rating,
            notes: self.notes,
            entry_date: parse_date(&self.entry_date, &ctx),
            created_at: parse_timestamp(&self.created_at, &ctx),
        }
    }
}

impl MedicationRow {
    pub fn into_medication(self) -> Medication {
        let ctx = format!("medication '{}'", self.id);
        let time_to_take = serde_json::from_str(&self.time_to_take).unwrap_or_else(|e| {
            warn!("Corrupt time_to_take '{}' on {}: {}", self.time_to_take, ctx, e);
            Vec::new()
        });
        Medication {
            id: parse_id(&self.id, &ctx),
            user_id: parse_id(&self.user_id, &ctx),
            name: self.name,
            dosage: self.dosage,
            frequency: self.frequency,
            time_to_take,
            notes: self.notes,
            active: self.active,
            created_at: parse_timestamp(&self.created_at, &ctx),
        }
    }
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        let ctx = format!("message '{}'", self.id);
        Message {
            id: parse_id(&self.id, &ctx),
            sender_id: parse_id(&self.sender_id, &ctx),
            recipient_id: parse_id(&self.recipient_id, &ctx),
            content: self.content,
            created_at: parse_timestamp(&self.created_at, &ctx),
            read_at: self.read_at.map(|t| parse_timestamp(&t, &ctx)),
        }
    }
}

impl NotificationRow {
    pub fn into_notification(self) -> Notification {
        let ctx = format!("notification '{}'", self.id);
        let kind = self.kind.parse().unwrap_or_else(|e: String| {
            warn!("{} on {}", e, ctx);
            NotificationKind::Message
        });
        Notification {
            id: parse_id(&self.id, &ctx),
            user_id: parse_id(&self.user_id, &ctx),
            kind,
            title: self.title,
            content: self.content,
            created_at: parse_timestamp(&self.created_at, &ctx),
            read_at: self.read_at.map(|t| parse_timestamp(&t, &ctx)),
        }
    }
}
