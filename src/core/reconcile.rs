//! GB-007: Reconciliation — compare desired state against the remote and converge.
//!
//! Each resource kind observes its current state on one project, and the
//! engine decides between no-op, create, update, delete-then-create and
//! destroy. Applying the same desired state twice yields `NoOp` the second
//! time.

use super::error::RemoteError;
use super::types::{PlanAction, Project};
use crate::transport::RemoteService;
use std::fmt::Debug;

/// How a resource kind converges when observed and desired differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// The service can modify the resource.
    InPlace,
    /// The resource must be deleted and created again.
    Recreate,
}

/// A remote resource attached to a project.
pub trait Reconcile {
    type State: PartialEq + Debug;

    /// Human-readable kind, e.g. `protected branch`.
    fn kind(&self) -> &'static str;

    /// Identifier within the project, e.g. the branch name.
    fn name(&self) -> String;

    fn mutation(&self) -> Mutation;

    /// Current state, `None` if the resource does not exist.
    fn observe(&self, remote: &dyn RemoteService, project: &Project) -> Result<Option<Self::State>, RemoteError>;

    fn create(&self, remote: &dyn RemoteService, project: &Project, desired: &Self::State) -> Result<(), RemoteError>;

    fn update(
        &self,
        _remote: &dyn RemoteService,
        _project: &Project,
        _observed: &Self::State,
        _desired: &Self::State,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Unsupported(self.kind()))
    }

    fn delete(&self, remote: &dyn RemoteService, project: &Project) -> Result<(), RemoteError>;
}

/// Decide the action for one resource.
pub fn plan<S: PartialEq>(observed: Option<&S>, desired: Option<&S>, mutation: Mutation) -> PlanAction {
    match (observed, desired) {
        (None, None) => PlanAction::NoOp,
        (Some(_), None) => PlanAction::Destroy,
        (None, Some(_)) => PlanAction::Create,
        (Some(o), Some(d)) if o == d => PlanAction::NoOp,
        (Some(_), Some(_)) => match mutation {
            Mutation::InPlace => PlanAction::Update,
            Mutation::Recreate => PlanAction::Recreate,
        },
    }
}

/// Observe, plan and (unless `dry_run`) apply. `desired = None` means absent.
pub fn reconcile<R: Reconcile>(
    remote: &dyn RemoteService,
    project: &Project,
    resource: &R,
    desired: Option<&R::State>,
    dry_run: bool,
) -> Result<PlanAction, RemoteError> {
    let observed = resource.observe(remote, project)?;
    let action = plan(observed.as_ref(), desired, resource.mutation());

    let marker = if dry_run { " (dry run)" } else { "" };
    if action == PlanAction::NoOp {
        tracing::debug!(
            "{} {} on {} is up to date: {:?}",
            resource.kind(),
            resource.name(),
            project.path_with_namespace,
            observed
        );
        return Ok(action);
    }
    tracing::info!(
        "{} {} {} on {}: {:?} -> {:?}{}",
        action,
        resource.kind(),
        resource.name(),
        project.path_with_namespace,
        observed,
        desired,
        marker
    );
    if dry_run {
        return Ok(action);
    }

    match (action, observed.as_ref(), desired) {
        (PlanAction::Create, _, Some(d)) => resource.create(remote, project, d)?,
        (PlanAction::Update, Some(o), Some(d)) => resource.update(remote, project, o, d)?,
        (PlanAction::Recreate, _, Some(d)) => {
            resource.delete(remote, project)?;
            resource.create(remote, project, d)?;
        }
        (PlanAction::Destroy, _, _) => resource.delete(remote, project)?,
        _ => {}
    }
    Ok(action)
}
