//! GB-008: Protected tag resource.

use crate::core::error::RemoteError;
use crate::core::reconcile::{Mutation, Reconcile};
use crate::core::types::{AccessLevel, Project};
use crate::transport::RemoteService;

/// Who may create tags matching a protected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagAccess {
    pub create: AccessLevel,
}

/// Protection of one tag name or wildcard pattern.
pub struct ProtectedTagResource {
    pub pattern: String,
}

impl ProtectedTagResource {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }
}

impl Reconcile for ProtectedTagResource {
    type State = TagAccess;

    fn kind(&self) -> &'static str {
        "protected tag"
    }

    fn name(&self) -> String {
        self.pattern.clone()
    }

    fn mutation(&self) -> Mutation {
        Mutation::Recreate
    }

    fn observe(&self, remote: &dyn RemoteService, project: &Project) -> Result<Option<TagAccess>, RemoteError> {
        Ok(remote
            .get_protected_tag(project.id, &self.pattern)?
            .map(|pt| TagAccess {
                create: super::first_level(&pt.create_access_levels),
            }))
    }

    fn create(&self, remote: &dyn RemoteService, project: &Project, desired: &TagAccess) -> Result<(), RemoteError> {
        remote.create_protected_tag(project.id, &self.pattern, desired.create)
    }

    fn delete(&self, remote: &dyn RemoteService, project: &Project) -> Result<(), RemoteError> {
        remote.delete_protected_tag(project.id, &self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reconcile::reconcile;
    use crate::core::types::PlanAction;
    use crate::transport::mock::MockRemote;

    #[test]
    fn test_gb008_protect_tag_pattern() {
        let remote = MockRemote::new().with_project(3, "student/bob");
        let project = remote.project("student/bob").unwrap();
        let desired = TagAccess { create: AccessLevel::NoAccess };
        let action = reconcile(&remote, &project, &ProtectedTagResource::new("submit-*"), Some(&desired), false).unwrap();
        assert_eq!(action, PlanAction::Create);
        assert_eq!(remote.mutations(), vec!["create_protected_tag 3 submit-* create=NO_ACCESS"]);
    }

    #[test]
    fn test_gb008_tag_protection_recreated() {
        let remote = MockRemote::new()
            .with_project(3, "student/bob")
            .with_protected_tag(3, "v*", AccessLevel::Developer);
        let project = remote.project("student/bob").unwrap();
        let desired = TagAccess { create: AccessLevel::Maintainer };
        let action = reconcile(&remote, &project, &ProtectedTagResource::new("v*"), Some(&desired), false).unwrap();
        assert_eq!(action, PlanAction::Recreate);
        assert_eq!(
            remote.mutations(),
            vec!["delete_protected_tag 3 v*", "create_protected_tag 3 v* create=MAINTAINER"]
        );
    }
}
