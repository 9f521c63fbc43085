use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use solace_types::api::{CreateMoodEntryRequest, MoodEntryPatch, MoodStats};
use solace_types::models::MoodEntry;

use crate::access::{self, Permission};
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct MoodListQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    30
}

fn validate_rating(rating: i64) -> Result<(), ApiError> {
    if !(1..=10).contains(&rating) {
        return Err(ApiError::validation(
            "mood_rating",
            "mood rating must be between 1 and 10",
        ));
    }
    Ok(())
}

fn validate_notes(notes: Option<&str>) -> Result<(), ApiError> {
    if let Some(notes) = notes {
        if notes.chars().count() > 1000 {
            return Err(ApiError::validation(
                "notes",
                "notes must be at most 1000 characters",
            ));
        }
    }
    Ok(())
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateMoodEntryRequest>,
) -> ApiResult<impl IntoResponse> {
    access::require(&user, Permission::LogMood)?;
    validate_rating(req.mood_rating)?;
    validate_notes(req.notes.as_deref())?;

    let row = state.db.insert_mood_entry(
        &Uuid::new_v4().to_string(),
        &user.id.to_string(),
        req.mood_rating,
        req.notes.as_deref(),
        &req.entry_date.to_string(),
    )?;

    Ok((StatusCode::CREATED, Json(row.into_entry())))
}

/// The caller's own diary, newest first, optionally restricted to a
/// date range.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<MoodListQuery>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<MoodEntry>>> {
    let entries = list_for(&state, &user.id.to_string(), &query)?;
    Ok(Json(entries))
}

/// A patient's diary as seen by their therapist, behind the
/// relationship gate.
pub async fn patient_entries(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<MoodListQuery>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<MoodEntry>>> {
    access::ensure_patient_access(&state.db, &user, patient_id)?;
    let entries = list_for(&state, &patient_id.to_string(), &query)?;
    Ok(Json(entries))
}

fn list_for(state: &AppState, user_id: &str, query: &MoodListQuery) -> ApiResult<Vec<MoodEntry>> {
    let start = query.start_date.map(|d| d.to_string());
    let end = query.end_date.map(|d| d.to_string());
    let range = match (&start, &end) {
        (Some(start), Some(end)) => Some((start.as_str(), end.as_str())),
        _ => None,
    };
    let rows = state.db.list_mood_entries(user_id, range, query.limit)?;
    Ok(rows.into_iter().map(|row| row.into_entry()).collect())
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(patch): Json<MoodEntryPatch>,
) -> ApiResult<Json<MoodEntry>> {
    access::require(&user, Permission::LogMood)?;
    if patch.is_empty() {
        return Err(ApiError::validation("body", "no fields to update"));
    }
    if let Some(rating) = patch.mood_rating {
        validate_rating(rating)?;
    }
    validate_notes(patch.notes.as_deref())?;

    let row = state
        .db
        .update_mood_entry(&id.to_string(), &user.id.to_string(), &patch)?
        .ok_or(ApiError::NotFound("Mood entry"))?;
    Ok(Json(row.into_entry()))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    access::require(&user, Permission::LogMood)?;
    let deleted = state
        .db
        .delete_mood_entry(&id.to_string(), &user.id.to_string())?;
    if !deleted {
        return Err(ApiError::NotFound("Mood entry"));
    }
    Ok(Json(serde_json::json!({ "message": "Mood entry deleted" })))
}

/// The caller's own aggregate mood statistics, computed fresh per call.
pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<MoodStats>> {
    let user_id = user.id.to_string();

    let avg_mood = state.db.mood_average(&user_id)?.unwrap_or(0.0);
    let total_entries = state.db.mood_entry_count(&user_id)?;
    let weekly_avg = state.db.weekly_mood_average(&user_id)?.unwrap_or(0.0);
    let recent_entries = state
        .db
        .list_mood_entries(&user_id, None, 7)?
        .into_iter()
        .map(|row| row.into_entry())
        .collect();

    Ok(Json(MoodStats {
        avg_mood: round1(avg_mood),
        total_entries,
        weekly_avg: round1(weekly_avg),
        recent_entries,
    }))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
