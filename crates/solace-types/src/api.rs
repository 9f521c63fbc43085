use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Medication, MoodEntry, Role, User};

// -- JWT Claims --

/// JWT claims shared between token issuance (auth handlers) and the REST
/// middleware. Canonical definition lives here in solace-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// -- Relationships --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipRequest {
    pub therapist_id: Uuid,
    pub patient_id: Uuid,
}

/// A patient under a therapist's care, annotated with statistics derived
/// at read time. `stats_complete` is false when one of the stat
/// sub-queries failed and the row carries defaults instead.
#[derive(Debug, Serialize)]
pub struct PatientOverview {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub assigned_at: DateTime<Utc>,
    pub mood_entries_count: i64,
    pub active_medications_count: i64,
    pub last_mood_entry: Option<MoodSample>,
    pub recent_mood_entries: Vec<MoodSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_mood: Option<f64>,
    pub stats_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoodSample {
    pub mood_rating: i64,
    pub entry_date: NaiveDate,
}

// -- Messaging --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub sender_role: Role,
}

/// One row per counterpart the user has exchanged messages with.
/// Derived, never stored.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub other_user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

// -- Mood diary --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMoodEntryRequest {
    pub mood_rating: i64,
    pub notes: Option<String>,
    pub entry_date: NaiveDate,
}

/// Explicit patch type enumerating exactly the mutable fields of a mood
/// entry; unknown fields are rejected at deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoodEntryPatch {
    pub mood_rating: Option<i64>,
    pub notes: Option<String>,
    pub entry_date: Option<NaiveDate>,
}

impl MoodEntryPatch {
    pub fn is_empty(&self) -> bool {
        self.mood_rating.is_none() && self.notes.is_none() && self.entry_date.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct MoodStats {
    pub avg_mood: f64,
    pub total_entries: i64,
    pub weekly_avg: f64,
    pub recent_entries: Vec<MoodEntry>,
}

// -- Medications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMedicationRequest {
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    #[serde(default)]
    pub time_to_take: Vec<String>,
    pub notes: Option<String>,
}

/// Explicit patch type for medications; the mutable fields and nothing else.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicationPatch {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub time_to_take: Option<Vec<String>>,
    pub notes: Option<String>,
    pub active: Option<bool>,
}

impl MedicationPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.dosage.is_none()
            && self.frequency.is_none()
            && self.time_to_take.is_none()
            && self.notes.is_none()
            && self.active.is_none()
    }
}

/// A medication joined with one of its scheduled times, annotated
/// relative to the current wall clock.
#[derive(Debug, Serialize)]
pub struct TodayMedication {
    #[serde(flatten)]
    pub medication: Medication,
    pub time: String,
    pub is_pending: bool,
    pub is_past_due: bool,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct ReminderCreated {
    pub user_id: Uuid,
    pub medication_name: String,
    pub time: String,
}

#[derive(Debug, Serialize)]
pub struct SweepOutcome {
    pub created_notifications: usize,
    pub notifications: Vec<ReminderCreated>,
}
