use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use solace_api::auth::{self, AppState, AppStateInner};
use solace_api::middleware::require_auth;
use solace_api::{medications, messages, mood, notifications, relationships};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solace=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("SOLACE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("SOLACE_DB_PATH").unwrap_or_else(|_| "solace.db".into());
    let host = std::env::var("SOLACE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SOLACE_PORT")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;

    // Init database
    let db = solace_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner { db, jwt_secret });

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Solace server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        // relationship registry
        .route("/api/relationships", post(relationships::create))
        .route("/api/relationships", delete(relationships::remove))
        .route("/api/relationships/patients", get(relationships::list_patients))
        .route("/api/relationships/therapists", get(relationships::list_therapists))
        .route(
            "/api/relationships/unassigned-patients",
            get(relationships::list_unassigned_patients),
        )
        // messaging
        .route("/api/messages", post(messages::send))
        .route("/api/messages/conversations", get(messages::conversations))
        .route("/api/messages/unread-count", get(messages::unread_count))
        .route("/api/messages/mark-read/{other_user_id}", put(messages::mark_read))
        .route("/api/messages/{other_user_id}", get(messages::with_user))
        // mood diary
        .route("/api/mood", post(mood::create))
        .route("/api/mood", get(mood::list))
        .route("/api/mood/stats", get(mood::stats))
        .route("/api/mood/patient/{patient_id}", get(mood::patient_entries))
        .route("/api/mood/{id}", put(mood::update))
        .route("/api/mood/{id}", delete(mood::delete))
        // medications
        .route("/api/medications", post(medications::create))
        .route("/api/medications", get(medications::list))
        .route("/api/medications/today", get(medications::today))
        .route(
            "/api/medications/patient/{patient_id}",
            get(medications::patient_medications),
        )
        .route("/api/medications/{id}", put(medications::update))
        .route("/api/medications/{id}", delete(medications::delete))
        // notifications
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/read-all", put(notifications::mark_all_read))
        .route("/api/notifications/{id}/read", put(notifications::mark_read))
        .route("/api/notifications/{id}", delete(notifications::delete))
        .route(
            "/api/notifications/medication-reminder",
            post(notifications::medication_reminder),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Store reachability probe.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "connected" })),
        ),
        Err(e) => {
            tracing::error!("health check failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "error" })),
            )
        }
    }
}
