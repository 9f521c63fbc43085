use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use solace_db::models::{ConversationRow, MessageRow, parse_id, parse_timestamp};
use solace_types::api::{
    ConversationSummary, MessageResponse, SendMessageRequest, UnreadCountResponse,
};
use solace_types::models::Role;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct MessagePageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// Send a message to a counterpart. Only permitted across an existing
/// therapeutic relationship in the matching role direction. The
/// recipient's notification is fan-out: its failure never unsends the
/// message.
pub async fn send(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let length = req.content.chars().count();
    if length == 0 || length > 2000 {
        return Err(ApiError::validation(
            "content",
            "content must be between 1 and 2000 characters",
        ));
    }

    // Run blocking DB work off the async runtime
    let db_state = state.clone();
    let sender = user.clone();
    let row = tokio::task::spawn_blocking(move || {
        let sender_id = sender.id.to_string();
        let recipient = db_state
            .db
            .get_user_by_id(&req.recipient_id.to_string())?
            .ok_or(ApiError::NotFound("Recipient"))?;

        let has_relation = match (sender.role, recipient.role.as_str()) {
            (Role::Patient, "therapist") => {
                db_state.db.relationship_exists(&recipient.id, &sender_id)?
            }
            (Role::Therapist, "patient") => {
                db_state.db.relationship_exists(&sender_id, &recipient.id)?
            }
            _ => false,
        };
        if !has_relation {
            return Err(ApiError::no_relationship());
        }

        let row = db_state.db.insert_message(
            &Uuid::new_v4().to_string(),
            &sender_id,
            &recipient.id,
            &req.content,
        )?;

        // Fire-and-forget fan-out: the message is sent either way.
        if let Err(e) = db_state.db.insert_notification(
            &Uuid::new_v4().to_string(),
            &recipient.id,
            "message",
            "New message",
            &format!(
                "You have received a new message from {} {}",
                sender.first_name, sender.last_name
            ),
        ) {
            warn!("notification fan-out for message failed: {e:#}");
        }

        Ok::<_, ApiError>(row)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow!("blocking task failed"))
    })??;

    Ok((StatusCode::CREATED, Json(to_response(row))))
}

/// One derived row per counterpart, most recently active first.
pub async fn conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let rows = state.db.list_conversations(&user.id.to_string())?;
    Ok(Json(rows.into_iter().map(to_summary).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let unread_count = state.db.unread_message_count(&user.id.to_string())?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(other_user_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state
        .db
        .mark_conversation_read(&user.id.to_string(), &other_user_id.to_string())?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

/// The message history with one counterpart, oldest to newest for
/// display, paginated over a newest-first scan. Viewing the page marks
/// everything inbound from that counterpart as read.
pub async fn with_user(
    State(state): State<AppState>,
    Path(other_user_id): Path<Uuid>,
    Query(query): Query<MessagePageQuery>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let db_state = state.clone();
    let user_id = user.id.to_string();
    let other_id = other_user_id.to_string();
    let limit = query.limit.min(200);
    let offset = query.offset;

    let rows = tokio::task::spawn_blocking(move || {
        if !db_state.db.relationship_exists_either(&user_id, &other_id)? {
            return Err(ApiError::no_relationship());
        }

        let mut rows = db_state
            .db
            .messages_between(&user_id, &other_id, limit, offset)?;
        db_state.db.mark_conversation_read(&user_id, &other_id)?;

        rows.reverse();
        Ok::<_, ApiError>(rows)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow!("blocking task failed"))
    })??;

    Ok(Json(rows.into_iter().map(to_response).collect()))
}

fn to_response(row: MessageRow) -> MessageResponse {
    let ctx = format!("message '{}'", row.id);
    MessageResponse {
        id: parse_id(&row.id, &ctx),
        sender_id: parse_id(&row.sender_id, &ctx),
        recipient_id: parse_id(&row.recipient_id, &ctx),
        created_at: parse_timestamp(&row.created_at, &ctx),
        read_at: row.read_at.as_deref().map(|t| parse_timestamp(t, &ctx)),
        content: row.content,
        sender_first_name: row.sender_first_name,
        sender_last_name: row.sender_last_name,
        sender_role: row.sender_role.parse().unwrap_or_else(|e| {
            warn!("{} on {}", e, ctx);
            Role::Patient
        }),
    }
}

fn to_summary(row: ConversationRow) -> ConversationSummary {
    let ctx = format!("conversation with '{}'", row.other_user_id);
    ConversationSummary {
        other_user_id: parse_id(&row.other_user_id, &ctx),
        first_name: row.first_name,
        last_name: row.last_name,
        role: row.role.parse().unwrap_or_else(|e| {
            warn!("{} on {}", e, ctx);
            Role::Patient
        }),
        last_message: row.last_message,
        last_message_time: parse_timestamp(&row.last_message_time, &ctx),
        unread_count: row.unread_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn send_req(recipient: &AuthUser, content: &str) -> SendMessageRequest {
        SendMessageRequest {
            recipient_id: recipient.id,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn send_without_relationship_is_forbidden_and_writes_nothing() {
        let state = testutil::state();
        let patient = testutil::create_user(&state, "p@example.com", "Pat", "Moss", Role::Patient);
        let therapist =
            testutil::create_user(&state, "t@example.com", "Tess", "Hart", Role::Therapist);

        let err = send(
            State(state.clone()),
            Extension(patient.clone()),
            Json(send_req(&therapist, "hello")),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(
            state
                .db
                .unread_message_count(&therapist.id.to_string())
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn send_then_view_round_trip() {
        let state = testutil::state();
        let therapist =
            testutil::create_user(&state, "t@example.com", "Tess", "Hart", Role::Therapist);
        let patient = testutil::create_user(&state, "p@example.com", "Pat", "Moss", Role::Patient);
        testutil::relate(&state, &therapist, &patient);

        let res = send(
            State(state.clone()),
            Extension(patient.clone()),
            Json(send_req(&therapist, "Hi")),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(res.status(), StatusCode::CREATED);

        // the therapist now has one unread message and a fan-out notification
        let tid = therapist.id.to_string();
        assert_eq!(state.db.unread_message_count(&tid).unwrap(), 1);
        let notes = state.db.list_notifications(&tid, 20, true).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, "message");

        // viewing the conversation returns the message and flips read state
        let page = with_user(
            State(state.clone()),
            Path(patient.id),
            Query(MessagePageQuery {
                limit: 50,
                offset: 0,
            }),
            Extension(therapist.clone()),
        )
        .await
        .unwrap();
        assert_eq!(page.0.len(), 1);
        assert_eq!(page.0[0].content, "Hi");
        assert_eq!(page.0[0].sender_id, patient.id);
        assert_eq!(state.db.unread_message_count(&tid).unwrap(), 0);
    }

    #[tokio::test]
    async fn strangers_cannot_read_or_send() {
        let state = testutil::state();
        let therapist =
            testutil::create_user(&state, "t@example.com", "Tess", "Hart", Role::Therapist);
        let stranger =
            testutil::create_user(&state, "t2@example.com", "Sam", "Oak", Role::Therapist);
        let patient = testutil::create_user(&state, "p@example.com", "Pat", "Moss", Role::Patient);
        testutil::relate(&state, &therapist, &patient);

        let err = with_user(
            State(state.clone()),
            Path(patient.id),
            Query(MessagePageQuery {
                limit: 50,
                offset: 0,
            }),
            Extension(stranger.clone()),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = send(
            State(state.clone()),
            Extension(stranger.clone()),
            Json(send_req(&patient, "let me in")),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn removing_the_relationship_closes_the_channel() {
        let state = testutil::state();
        let therapist =
            testutil::create_user(&state, "t@example.com", "Tess", "Hart", Role::Therapist);
        let patient = testutil::create_user(&state, "p@example.com", "Pat", "Moss", Role::Patient);
        testutil::relate(&state, &therapist, &patient);

        send(
            State(state.clone()),
            Extension(patient.clone()),
            Json(send_req(&therapist, "Hi")),
        )
        .await
        .unwrap();

        state
            .db
            .delete_relationship(&therapist.id.to_string(), &patient.id.to_string())
            .unwrap();

        let err = send(
            State(state.clone()),
            Extension(patient.clone()),
            Json(send_req(&therapist, "test")),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn content_length_is_validated() {
        let state = testutil::state();
        let therapist =
            testutil::create_user(&state, "t@example.com", "Tess", "Hart", Role::Therapist);
        let patient = testutil::create_user(&state, "p@example.com", "Pat", "Moss", Role::Patient);
        testutil::relate(&state, &therapist, &patient);

        let err = send(
            State(state.clone()),
            Extension(patient.clone()),
            Json(send_req(&therapist, "")),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Validation { field: "content", .. }));

        let long = "x".repeat(2001);
        let err = send(
            State(state.clone()),
            Extension(patient.clone()),
            Json(send_req(&therapist, &long)),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Validation { field: "content", .. }));
    }

    #[tokio::test]
    async fn conversation_listing_reflects_activity() {
        let state = testutil::state();
        let therapist =
            testutil::create_user(&state, "t@example.com", "Tess", "Hart", Role::Therapist);
        let patient = testutil::create_user(&state, "p@example.com", "Pat", "Moss", Role::Patient);
        testutil::relate(&state, &therapist, &patient);

        send(
            State(state.clone()),
            Extension(patient.clone()),
            Json(send_req(&therapist, "first")),
        )
        .await
        .unwrap();
        send(
            State(state.clone()),
            Extension(patient.clone()),
            Json(send_req(&therapist, "second")),
        )
        .await
        .unwrap();

        let convs = conversations(State(state.clone()), Extension(therapist.clone()))
            .await
            .unwrap();
        assert_eq!(convs.0.len(), 1);
        assert_eq!(convs.0[0].other_user_id, patient.id);
        assert_eq!(convs.0[0].last_message, "second");
        assert_eq!(convs.0[0].unread_count, 2);
        assert_eq!(convs.0[0].first_name, "Pat");
    }
}
