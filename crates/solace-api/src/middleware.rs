use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use solace_types::api::Claims;
use solace_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;

/// The authenticated caller identity, injected into request extensions
/// by `require_auth` and trusted by every handler behind it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Extract and validate the JWT from the Authorization header, then
/// re-resolve the user row so a token for a deleted account stops
/// working immediately.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    let user = state
        .db
        .get_user_by_id(&token_data.claims.sub.to_string())?
        .ok_or(ApiError::Unauthorized)?
        .into_user();

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        role: user.role,
    });
    Ok(next.run(req).await)
}
