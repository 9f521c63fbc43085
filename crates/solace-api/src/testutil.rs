use std::sync::Arc;

use uuid::Uuid;

use solace_db::Database;
use solace_types::models::Role;

use crate::auth::{AppState, AppStateInner};
use crate::middleware::AuthUser;

pub fn state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("in-memory db"),
        jwt_secret: "test-secret".to_string(),
    })
}

pub fn create_user(state: &AppState, email: &str, first: &str, last: &str, role: Role) -> AuthUser {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(&id.to_string(), email, "hash", first, last, role.as_str())
        .expect("create user");
    AuthUser {
        id,
        email: email.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        role,
    }
}

pub fn relate(state: &AppState, therapist: &AuthUser, patient: &AuthUser) {
    state
        .db
        .create_relationship(
            &Uuid::new_v4().to_string(),
            &therapist.id.to_string(),
            &patient.id.to_string(),
        )
        .expect("create relationship");
}
