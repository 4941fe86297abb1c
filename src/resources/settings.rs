//! GB-008: Project settings resource.
//!
//! Only the settings named in the desired state are tracked; everything
//! else on the project is left alone.

use crate::core::error::RemoteError;
use crate::core::reconcile::{Mutation, Reconcile};
use crate::core::types::Project;
use crate::transport::RemoteService;
use serde_json::{Map, Value};

/// Subset of project settings. `None` means "not managed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSettings {
    pub mr_default_target_self: Option<bool>,
    pub description: Option<String>,
    pub squash_option: Option<String>,
}

impl ProjectSettings {
    pub fn is_empty(&self) -> bool {
        self.mr_default_target_self.is_none() && self.description.is_none() && self.squash_option.is_none()
    }

    /// Project values for the fields `self` manages.
    fn project_onto(&self, project: &Project) -> ProjectSettings {
        ProjectSettings {
            mr_default_target_self: self
                .mr_default_target_self
                .map(|_| project.mr_default_target_self.unwrap_or(false)),
            description: self
                .description
                .as_ref()
                .map(|_| project.description.clone().unwrap_or_default()),
            squash_option: self
                .squash_option
                .as_ref()
                .map(|_| project.squash_option.clone().unwrap_or_default()),
        }
    }

    /// API attributes for the fields of `self` that differ from `observed`.
    fn changes_from(&self, observed: &ProjectSettings) -> Map<String, Value> {
        let mut changes = Map::new();
        if let Some(v) = self.mr_default_target_self {
            if observed.mr_default_target_self != Some(v) {
                changes.insert("mr_default_target_self".to_string(), Value::Bool(v));
            }
        }
        if let Some(v) = &self.description {
            if observed.description.as_ref() != Some(v) {
                changes.insert("description".to_string(), Value::String(v.clone()));
            }
        }
        if let Some(v) = &self.squash_option {
            if observed.squash_option.as_ref() != Some(v) {
                changes.insert("squash_option".to_string(), Value::String(v.clone()));
            }
        }
        changes
    }
}

/// Settings of one project, modified in place.
pub struct ProjectSettingsResource<'a> {
    pub desired: &'a ProjectSettings,
}

impl Reconcile for ProjectSettingsResource<'_> {
    type State = ProjectSettings;

    fn kind(&self) -> &'static str {
        "project settings"
    }

    fn name(&self) -> String {
        let mut fields = Vec::new();
        if self.desired.mr_default_target_self.is_some() {
            fields.push("mr_default_target_self");
        }
        if self.desired.description.is_some() {
            fields.push("description");
        }
        if self.desired.squash_option.is_some() {
            fields.push("squash_option");
        }
        fields.join(",")
    }

    fn mutation(&self) -> Mutation {
        Mutation::InPlace
    }

    fn observe(&self, remote: &dyn RemoteService, project: &Project) -> Result<Option<ProjectSettings>, RemoteError> {
        let fresh = remote.get_project(&project.id.to_string())?;
        Ok(Some(self.desired.project_onto(&fresh)))
    }

    fn create(&self, _remote: &dyn RemoteService, _project: &Project, _desired: &ProjectSettings) -> Result<(), RemoteError> {
        Err(RemoteError::Unsupported(self.kind()))
    }

    fn update(
        &self,
        remote: &dyn RemoteService,
        project: &Project,
        observed: &ProjectSettings,
        desired: &ProjectSettings,
    ) -> Result<(), RemoteError> {
        remote.update_project(project.id, &desired.changes_from(observed))
    }

    fn delete(&self, _remote: &dyn RemoteService, _project: &Project) -> Result<(), RemoteError> {
        Err(RemoteError::Unsupported(self.kind()))
    }
}
