//! GB-008: Project membership resource.

use crate::core::error::RemoteError;
use crate::core::reconcile::{Mutation, Reconcile};
use crate::core::types::{Account, AccessLevel, Project};
use crate::transport::RemoteService;

/// Membership of one account; the level is changed in place.
pub struct MembershipResource<'a> {
    pub account: &'a Account,
}

impl<'a> MembershipResource<'a> {
    pub fn new(account: &'a Account) -> Self {
        Self { account }
    }
}

impl Reconcile for MembershipResource<'_> {
    type State = AccessLevel;

    fn kind(&self) -> &'static str {
        "member"
    }

    fn name(&self) -> String {
        self.account.username.clone()
    }

    fn mutation(&self) -> Mutation {
        Mutation::InPlace
    }

    fn observe(&self, remote: &dyn RemoteService, project: &Project) -> Result<Option<AccessLevel>, RemoteError> {
        Ok(remote
            .get_member(project.id, self.account.id)?
            .map(|m| m.access_level))
    }

    fn create(&self, remote: &dyn RemoteService, project: &Project, desired: &AccessLevel) -> Result<(), RemoteError> {
        remote.add_member(project.id, self.account.id, *desired)
    }

    fn update(
        &self,
        remote: &dyn RemoteService,
        project: &Project,
        _observed: &AccessLevel,
        desired: &AccessLevel,
    ) -> Result<(), RemoteError> {
        remote.update_member(project.id, self.account.id, *desired)
    }

    fn delete(&self, remote: &dyn RemoteService, project: &Project) -> Result<(), RemoteError> {
        remote.remove_member(project.id, self.account.id)
    }
}
