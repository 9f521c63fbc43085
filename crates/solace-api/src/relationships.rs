use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;
use uuid::Uuid;

use solace_db::models::parse_timestamp;
use solace_types::api::{MoodSample, PatientOverview, RelationshipRequest};
use solace_types::models::User;

use crate::access::{self, Permission};
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<RelationshipRequest>,
) -> ApiResult<impl IntoResponse> {
    access::require(&user, Permission::ManageRelationships)?;
    if req.therapist_id != user.id {
        return Err(ApiError::Forbidden(
            "You may only manage your own relationships".to_string(),
        ));
    }

    let therapist_id = req.therapist_id.to_string();
    let patient_id = req.patient_id.to_string();

    // Both sides must resolve to users of the expected role.
    state
        .db
        .get_user_by_id(&therapist_id)?
        .filter(|row| row.role == "therapist")
        .ok_or(ApiError::NotFound("Therapist"))?;
    state
        .db
        .get_user_by_id(&patient_id)?
        .filter(|row| row.role == "patient")
        .ok_or(ApiError::NotFound("Patient"))?;

    if state.db.relationship_exists(&therapist_id, &patient_id)? {
        return Err(ApiError::Conflict("Relationship already exists".to_string()));
    }

    state
        .db
        .create_relationship(&Uuid::new_v4().to_string(), &therapist_id, &patient_id)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "Relationship created" })),
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<RelationshipRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    access::require(&user, Permission::ManageRelationships)?;
    if req.therapist_id != user.id {
        return Err(ApiError::Forbidden(
            "You may only remove your own relationships".to_string(),
        ));
    }

    let removed = state
        .db
        .delete_relationship(&req.therapist_id.to_string(), &req.patient_id.to_string())?;
    if !removed {
        return Err(ApiError::NotFound("Relationship"));
    }

    Ok(Json(serde_json::json!({ "message": "Relationship removed" })))
}

/// A therapist's patients, each annotated with read-time statistics.
/// Stat sub-queries fail independently: a row whose stats could not be
/// assembled is returned with defaults and stats_complete = false
/// instead of failing the whole listing.
pub async fn list_patients(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<PatientOverview>>> {
    access::require(&user, Permission::ViewPatientRecords)?;

    let rows = state.db.list_patients_of(&user.id.to_string())?;
    let overviews = rows
        .into_iter()
        .map(|(row, assigned_at)| {
            let ctx = format!("relationship of patient '{}'", row.id);
            let assigned_at = parse_timestamp(&assigned_at, &ctx);
            let patient_id = row.id.clone();
            let patient = row.into_user();

            let mut complete = true;
            let mut fail = |what: &str, e: anyhow::Error| {
                warn!("stats for patient {patient_id}: {what} failed: {e:#}");
                complete = false;
            };

            let mood_entries_count = state
                .db
                .mood_entry_count(&patient_id)
                .unwrap_or_else(|e| {
                    fail("mood count", e);
                    0
                });
            let active_medications_count = state
                .db
                .active_medication_count(&patient_id)
                .unwrap_or_else(|e| {
                    fail("medication count", e);
                    0
                });
            let last_mood_entry = state
                .db
                .last_mood_entry(&patient_id)
                .unwrap_or_else(|e| {
                    fail("last mood entry", e);
                    None
                })
                .map(|entry| sample(&entry));
            let recent_mood_entries: Vec<MoodSample> = state
                .db
                .recent_mood_entries(&patient_id)
                .unwrap_or_else(|e| {
                    fail("recent mood entries", e);
                    Vec::new()
                })
                .iter()
                .map(sample)
                .collect();

            let average_mood = average(&recent_mood_entries);

            PatientOverview {
                id: patient.id,
                email: patient.email,
                first_name: patient.first_name,
                last_name: patient.last_name,
                created_at: patient.created_at,
                assigned_at,
                mood_entries_count,
                active_medications_count,
                last_mood_entry,
                recent_mood_entries,
                average_mood,
                stats_complete: complete,
            }
        })
        .collect();

    Ok(Json(overviews))
}

/// All therapists, unfiltered by relationship; populates the
/// "start new conversation" picker for patients.
pub async fn list_therapists(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<User>>> {
    access::require(&user, Permission::ListTherapists)?;
    let therapists = state
        .db
        .list_users_by_role("therapist")?
        .into_iter()
        .map(|row| row.into_user())
        .collect();
    Ok(Json(therapists))
}

/// All patients minus those already under this therapist.
pub async fn list_unassigned_patients(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<User>>> {
    access::require(&user, Permission::ManageRelationships)?;
    let patients = state
        .db
        .list_unassigned_patients(&user.id.to_string())?
        .into_iter()
        .map(|row| row.into_user())
        .collect();
    Ok(Json(patients))
}

fn sample(entry: &solace_db::models::MoodEntryRow) -> MoodSample {
    let ctx = format!("mood entry '{}'", entry.id);
    MoodSample {
        mood_rating: entry.mood_rating,
        entry_date: entry.entry_date.parse().unwrap_or_else(|e| {
            warn!("Corrupt entry_date '{}' on {}: {}", entry.entry_date, ctx, e);
            Default::default()
        }),
    }
}

/// Arithmetic mean over the recent window, one decimal place; absent
/// when the window is empty.
fn average(samples: &[MoodSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: i64 = samples.iter().map(|s| s.mood_rating).sum();
    let mean = sum as f64 / samples.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}
