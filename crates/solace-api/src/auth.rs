use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use solace_db::Database;
use solace_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use solace_types::models::{Role, User};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() < 5 {
        return Err(ApiError::validation("email", "invalid email address"));
    }
    if req.password.len() < 6 {
        return Err(ApiError::validation(
            "password",
            "password must be at least 6 characters",
        ));
    }
    if req.first_name.trim().len() < 2 {
        return Err(ApiError::validation(
            "first_name",
            "first name must be at least 2 characters",
        ));
    }
    if req.last_name.trim().len() < 2 {
        return Err(ApiError::validation(
            "last_name",
            "last name must be at least 2 characters",
        ));
    }

    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict(
            "A user with this email already exists".to_string(),
        ));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?
        .to_string();

    let user_id = Uuid::new_v4();
    state.db.create_user(
        &user_id.to_string(),
        &email,
        &password_hash,
        req.first_name.trim(),
        req.last_name.trim(),
        req.role.as_str(),
    )?;

    let user = state
        .db
        .get_user_by_id(&user_id.to_string())?
        .ok_or_else(|| anyhow!("user vanished after insert"))?
        .into_user();

    let token = create_token(&state.jwt_secret, user_id, req.role)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();

    // Unknown email and bad password are indistinguishable to the caller.
    let row = state
        .db
        .get_user_by_email(&email)?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash =
        PasswordHash::new(&row.password).map_err(|e| anyhow!("stored hash unreadable: {e}"))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user = row.into_user();
    let token = create_token(&state.jwt_secret, user.id, user.role)?;

    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<User>> {
    let user = state
        .db
        .get_user_by_id(&auth.id.to_string())?
        .ok_or(ApiError::Unauthorized)?
        .into_user();
    Ok(Json(user))
}

fn create_token(secret: &str, user_id: Uuid, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        role,
        exp: (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
