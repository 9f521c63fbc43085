use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use solace_types::api::{ReminderCreated, SweepOutcome, UnreadCountResponse};
use solace_types::models::Notification;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub unread_only: bool,
}

fn default_limit() -> u32 {
    20
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<NotificationListQuery>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Notification>>> {
    let rows = state
        .db
        .list_notifications(&user.id.to_string(), query.limit, query.unread_only)?;
    Ok(Json(rows.into_iter().map(|r| r.into_notification()).collect()))
}

/// Idempotent: re-marking an already-read notification is a no-op that
/// keeps the original timestamp.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Notification>> {
    let row = state
        .db
        .mark_notification_read(&id.to_string(), &user.id.to_string())?
        .ok_or(ApiError::NotFound("Notification"))?;
    Ok(Json(row.into_notification()))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state
        .db
        .mark_all_notifications_read(&user.id.to_string())?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let unread_count = state
        .db
        .unread_notification_count(&user.id.to_string())?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state
        .db
        .delete_notification(&id.to_string(), &user.id.to_string())?;
    if !deleted {
        return Err(ApiError::NotFound("Notification"));
    }
    Ok(Json(serde_json::json!({ "message": "Notification deleted" })))
}

/// The medication-reminder sweep. Invoked by an external periodic
/// trigger; there is no in-process scheduler.
pub async fn medication_reminder(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
) -> ApiResult<Json<SweepOutcome>> {
    let now = chrono::Local::now().naive_local();
    let outcome = run_sweep(&state, now)?;
    info!(
        "medication reminder sweep created {} notifications",
        outcome.created_notifications
    );
    Ok(Json(outcome))
}

/// For every active medication with a scheduled time inside the next 60
/// minutes that has not yet produced a reminder today, insert one
/// notification per qualifying (medication, time) pair.
fn run_sweep(state: &AppState, now: NaiveDateTime) -> Result<SweepOutcome, ApiError> {
    let medications = state.db.list_all_active_medications()?;

    let mut created = Vec::new();
    for row in medications {
        let medication = row.into_medication();
        let user_id = medication.user_id.to_string();

        for time in due_within_next_hour(&medication.time_to_take, now) {
            if state
                .db
                .medication_reminder_exists_today(&user_id, &medication.name)?
            {
                continue;
            }

            let dosage = medication.dosage.as_deref().unwrap_or("dose unspecified");
            state.db.insert_notification(
                &Uuid::new_v4().to_string(),
                &user_id,
                "medication",
                &format!("Medication reminder: {}", medication.name),
                &format!(
                    "Time to take your medication: {} ({}) at {}",
                    medication.name, dosage, time
                ),
            )?;
            created.push(ReminderCreated {
                user_id: medication.user_id,
                medication_name: medication.name.clone(),
                time,
            });
        }
    }

    Ok(SweepOutcome {
        created_notifications: created.len(),
        notifications: created,
    })
}

/// Times of day strictly after `now` and no more than one hour ahead,
/// evaluated against today's date (a time already past today does not
/// qualify, matching the sweep's same-day semantics).
fn due_within_next_hour(times: &[String], now: NaiveDateTime) -> Vec<String> {
    let window_end = now + Duration::hours(1);
    times
        .iter()
        .filter(|time| match NaiveTime::parse_from_str(time, "%H:%M") {
            Ok(parsed) => {
                let at = now.date().and_time(parsed);
                at > now && at <= window_end
            }
            Err(e) => {
                warn!("Unparseable medication time '{}': {}", time, e);
                false
            }
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use solace_types::models::Role;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 7)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn times(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn window_is_exclusive_below_and_inclusive_above() {
        let now = at(9, 0);
        let due = due_within_next_hour(&times(&["08:59", "09:00", "09:30", "10:00", "10:01"]), now);
        assert_eq!(due, times(&["09:30", "10:00"]));
    }

    #[test]
    fn times_past_midnight_do_not_wrap() {
        let now = at(23, 30);
        let due = due_within_next_hour(&times(&["23:45", "00:15"]), now);
        assert_eq!(due, times(&["23:45"]));
    }

    #[test]
    fn garbage_times_are_skipped() {
        let due = due_within_next_hour(&times(&["soon", "9am", "09:30"]), at(9, 0));
        assert_eq!(due, times(&["09:30"]));
    }

    #[tokio::test]
    async fn sweep_creates_once_per_medication_per_day() {
        let state = testutil::state();
        let patient = testutil::create_user(&state, "p@example.com", "Pat", "Moss", Role::Patient);
        let pid = patient.id.to_string();

        state
            .db
            .insert_medication(
                &Uuid::new_v4().to_string(),
                &pid,
                "Sertraline",
                Some("50mg"),
                None,
                &times(&["09:30"]),
                None,
            )
            .unwrap();

        let first = run_sweep(&state, at(9, 0)).unwrap();
        assert_eq!(first.created_notifications, 1);
        assert_eq!(first.notifications[0].medication_name, "Sertraline");
        assert_eq!(first.notifications[0].time, "09:30");

        let rows = state.db.list_notifications(&pid, 20, false).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "medication");
        assert!(rows[0].title.contains("Sertraline"));

        // same day, second sweep: deduplicated
        let second = run_sweep(&state, at(9, 10)).unwrap();
        assert_eq!(second.created_notifications, 0);
        assert_eq!(state.db.list_notifications(&pid, 20, false).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_ignores_inactive_and_out_of_window_medications() {
        let state = testutil::state();
        let patient = testutil::create_user(&state, "p@example.com", "Pat", "Moss", Role::Patient);
        let pid = patient.id.to_string();

        let inactive_id = Uuid::new_v4().to_string();
        state
            .db
            .insert_medication(&inactive_id, &pid, "Lithium", None, None, &times(&["09:30"]), None)
            .unwrap();
        state.db.deactivate_medication(&inactive_id, &pid).unwrap();

        state
            .db
            .insert_medication(
                &Uuid::new_v4().to_string(),
                &pid,
                "Sertraline",
                None,
                None,
                &times(&["20:00"]),
                None,
            )
            .unwrap();

        let outcome = run_sweep(&state, at(9, 0)).unwrap();
        assert_eq!(outcome.created_notifications, 0);
    }

    #[tokio::test]
    async fn notification_lifecycle_is_ownership_scoped() {
        let state = testutil::state();
        let owner = testutil::create_user(&state, "o@example.com", "Ann", "Lee", Role::Patient);
        let other = testutil::create_user(&state, "x@example.com", "Bob", "Ray", Role::Patient);

        let note_id = Uuid::new_v4();
        state
            .db
            .insert_notification(
                &note_id.to_string(),
                &owner.id.to_string(),
                "message",
                "New message",
                "hello",
            )
            .unwrap();

        let err = mark_read(
            State(state.clone()),
            Path(note_id),
            Extension(other.clone()),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::NotFound("Notification")));

        let err = delete(
            State(state.clone()),
            Path(note_id),
            Extension(other.clone()),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::NotFound("Notification")));

        // the owner can mark it read twice without the timestamp moving
        let first = mark_read(
            State(state.clone()),
            Path(note_id),
            Extension(owner.clone()),
        )
        .await
        .unwrap();
        let stamped = first.0.read_at.unwrap();

        let second = mark_read(
            State(state.clone()),
            Path(note_id),
            Extension(owner.clone()),
        )
        .await
        .unwrap();
        assert_eq!(second.0.read_at.unwrap(), stamped);

        let count = unread_count(State(state.clone()), Extension(owner.clone()))
            .await
            .unwrap();
        assert_eq!(count.0.unread_count, 0);
    }
}
