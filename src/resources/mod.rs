//! Resource kinds the reconciliation engine converges on a project.
//!
//! Each kind implements [`crate::core::reconcile::Reconcile`]:
//! 1. `observe` reads the current state from the service
//! 2. `create` / `update` / `delete` converge it to the desired state

pub mod branch;
pub mod member;
pub mod settings;
pub mod tag;

/// First level of a grant list; an empty list means nobody is allowed.
pub(crate) fn first_level(grants: &[crate::core::types::AccessLevelGrant]) -> crate::core::types::AccessLevel {
    grants
        .first()
        .map(|g| g.access_level)
        .unwrap_or(crate::core::types::AccessLevel::NoAccess)
}
