//! GB-008: Protected branch resource.

use crate::core::error::RemoteError;
use crate::core::reconcile::{Mutation, Reconcile};
use crate::core::types::{AccessLevel, Project};
use crate::transport::RemoteService;

/// Who may merge into and push to a protected branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchAccess {
    pub merge: AccessLevel,
    pub push: AccessLevel,
}

/// Protection of one branch. The service cannot edit protection, so any
/// difference is converged by unprotecting and protecting again.
pub struct ProtectedBranchResource {
    pub branch: String,
}

impl ProtectedBranchResource {
    pub fn new(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
        }
    }
}

impl Reconcile for ProtectedBranchResource {
    type State = BranchAccess;

    fn kind(&self) -> &'static str {
        "protected branch"
    }

    fn name(&self) -> String {
        self.branch.clone()
    }

    fn mutation(&self) -> Mutation {
        Mutation::Recreate
    }

    fn observe(&self, remote: &dyn RemoteService, project: &Project) -> Result<Option<BranchAccess>, RemoteError> {
        Ok(remote
            .get_protected_branch(project.id, &self.branch)?
            .map(|pb| BranchAccess {
                merge: super::first_level(&pb.merge_access_levels),
                push: super::first_level(&pb.push_access_levels),
            }))
    }

    fn create(&self, remote: &dyn RemoteService, project: &Project, desired: &BranchAccess) -> Result<(), RemoteError> {
        remote.create_protected_branch(project.id, &self.branch, desired.merge, desired.push)
    }

    fn delete(&self, remote: &dyn RemoteService, project: &Project) -> Result<(), RemoteError> {
        remote.delete_protected_branch(project.id, &self.branch)
    }
}
