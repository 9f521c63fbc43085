use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveTime;
use serde::Deserialize;
use uuid::Uuid;

use solace_types::api::{CreateMedicationRequest, MedicationPatch, TodayMedication};
use solace_types::models::Medication;

use crate::access::{self, Permission};
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct MedicationListQuery {
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let length = name.chars().count();
    if length == 0 || length > 255 {
        return Err(ApiError::validation(
            "name",
            "name must be between 1 and 255 characters",
        ));
    }
    Ok(())
}

fn validate_optional(field: &'static str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    if let Some(value) = value {
        if value.chars().count() > max {
            return Err(ApiError::validation(
                field,
                format!("{field} must be at most {max} characters"),
            ));
        }
    }
    Ok(())
}

fn validate_times(times: &[String]) -> Result<(), ApiError> {
    for time in times {
        if NaiveTime::parse_from_str(time, "%H:%M").is_err() {
            return Err(ApiError::validation(
                "time_to_take",
                format!("'{time}' is not a valid HH:MM time"),
            ));
        }
    }
    Ok(())
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateMedicationRequest>,
) -> ApiResult<impl IntoResponse> {
    access::require(&user, Permission::ManageMedications)?;
    validate_name(&req.name)?;
    validate_optional("dosage", req.dosage.as_deref(), 100)?;
    validate_optional("frequency", req.frequency.as_deref(), 100)?;
    validate_optional("notes", req.notes.as_deref(), 1000)?;
    validate_times(&req.time_to_take)?;

    let row = state.db.insert_medication(
        &Uuid::new_v4().to_string(),
        &user.id.to_string(),
        &req.name,
        req.dosage.as_deref(),
        req.frequency.as_deref(),
        &req.time_to_take,
        req.notes.as_deref(),
    )?;

    Ok((StatusCode::CREATED, Json(row.into_medication())))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<MedicationListQuery>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Medication>>> {
    let rows = state
        .db
        .list_medications(&user.id.to_string(), query.active)?;
    Ok(Json(rows.into_iter().map(|r| r.into_medication()).collect()))
}

/// A patient's medications as seen by their therapist, behind the
/// relationship gate.
pub async fn patient_medications(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<MedicationListQuery>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Medication>>> {
    access::ensure_patient_access(&state.db, &user, patient_id)?;
    let rows = state
        .db
        .list_medications(&patient_id.to_string(), query.active)?;
    Ok(Json(rows.into_iter().map(|r| r.into_medication()).collect()))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(patch): Json<MedicationPatch>,
) -> ApiResult<Json<Medication>> {
    access::require(&user, Permission::ManageMedications)?;
    if patch.is_empty() {
        return Err(ApiError::validation("body", "no fields to update"));
    }
    if let Some(name) = &patch.name {
        validate_name(name)?;
    }
    validate_optional("dosage", patch.dosage.as_deref(), 100)?;
    validate_optional("frequency", patch.frequency.as_deref(), 100)?;
    validate_optional("notes", patch.notes.as_deref(), 1000)?;
    if let Some(times) = &patch.time_to_take {
        validate_times(times)?;
    }

    let row = state
        .db
        .update_medication(&id.to_string(), &user.id.to_string(), &patch)?
        .ok_or(ApiError::NotFound("Medication"))?;
    Ok(Json(row.into_medication()))
}

/// Soft delete: the medication is deactivated, never removed.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    access::require(&user, Permission::ManageMedications)?;
    let deactivated = state
        .db
        .deactivate_medication(&id.to_string(), &user.id.to_string())?;
    if !deactivated {
        return Err(ApiError::NotFound("Medication"));
    }
    Ok(Json(serde_json::json!({ "message": "Medication deleted" })))
}

/// Today's schedule: one row per (medication, time), annotated
/// pending/past-due against the server's wall clock, sorted by time.
pub async fn today(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<TodayMedication>>> {
    access::require(&user, Permission::ManageMedications)?;
    let rows = state.db.list_medications(&user.id.to_string(), true)?;
    let now = chrono::Local::now().time();
    Ok(Json(expand_today(
        rows.into_iter().map(|r| r.into_medication()).collect(),
        now,
    )))
}

fn expand_today(medications: Vec<Medication>, now: NaiveTime) -> Vec<TodayMedication> {
    let mut schedule: Vec<(NaiveTime, TodayMedication)> = Vec::new();
    for medication in medications {
        for time in &medication.time_to_take {
            let Ok(at) = NaiveTime::parse_from_str(time, "%H:%M") else {
                continue;
            };
            schedule.push((
                at,
                TodayMedication {
                    medication: medication.clone(),
                    time: time.clone(),
                    is_pending: at > now,
                    is_past_due: at < now,
                },
            ));
        }
    }
    schedule.sort_by_key(|(at, _)| *at);
    schedule.into_iter().map(|(_, item)| item).collect()
}
