//! The access-control layer: a static role-to-permission mapping for
//! role-gated operations, and the relationship gate consulted before
//! any cross-user read of clinical data.

use anyhow::Result;
use uuid::Uuid;

use solace_db::Database;
use solace_types::models::Role;

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    LogMood,
    ManageMedications,
    ListTherapists,
    ManageRelationships,
    ViewPatientRecords,
}

/// Capabilities are derived from the role in one place rather than
/// scattered role conditionals in handlers.
pub fn permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Patient => &[
            Permission::LogMood,
            Permission::ManageMedications,
            Permission::ListTherapists,
        ],
        Role::Therapist => &[
            Permission::ManageRelationships,
            Permission::ViewPatientRecords,
        ],
    }
}

pub fn require(user: &AuthUser, permission: Permission) -> Result<(), ApiError> {
    if permissions(user.role).contains(&permission) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

/// True iff the requester is the patient themselves, or a therapist
/// holding a relationship with the patient.
pub fn can_access_patient_data(
    db: &Database,
    requester: &AuthUser,
    patient_id: Uuid,
) -> Result<bool> {
    if requester.id == patient_id {
        return Ok(true);
    }
    if requester.role != Role::Therapist {
        return Ok(false);
    }
    db.relationship_exists(&requester.id.to_string(), &patient_id.to_string())
}

/// Forbidden, not NotFound: the caller learns the data exists but is
/// out of reach.
pub fn ensure_patient_access(
    db: &Database,
    requester: &AuthUser,
    patient_id: Uuid,
) -> Result<(), ApiError> {
    if can_access_patient_data(db, requester, patient_id)? {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Patient not assigned to this therapist".to_string(),
        ))
    }
}
