//! GB-010/011: Transport to the remote GitLab service and to local git.
//!
//! Everything the commands need from GitLab goes through [`RemoteService`].
//! Calls are blocking; a row waits for each call before moving on.

pub mod gitlab;
pub mod local;
#[cfg(test)]
pub mod mock;

use crate::core::error::RemoteError;
use crate::core::types::*;
use chrono::{DateTime, Utc};

/// Operations on the remote hosting service.
///
/// Lookups of sub-resources return `Ok(None)` when the resource does not
/// exist; `get_project` reports a missing project as [`RemoteError::NotFound`].
pub trait RemoteService {
    /// Accounts whose username equals `login` (normally zero or one).
    fn find_users(&self, login: &str) -> Result<Vec<Account>, RemoteError>;

    /// Project by `namespace/path` or numeric id.
    fn get_project(&self, path_or_id: &str) -> Result<Project, RemoteError>;

    /// Fork `parent_id` into `namespace/name`. A conflict means it already exists.
    fn fork_project(&self, parent_id: u64, namespace: &str, name: &str) -> Result<Project, RemoteError>;

    /// Remove the "forked from" relationship; `NotModified` if there is none.
    fn delete_fork_relation(&self, project_id: u64) -> Result<(), RemoteError>;

    fn update_project(
        &self,
        project_id: u64,
        changes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), RemoteError>;

    fn get_protected_branch(&self, project_id: u64, name: &str) -> Result<Option<ProtectedBranch>, RemoteError>;

    fn create_protected_branch(
        &self,
        project_id: u64,
        name: &str,
        merge_access_level: AccessLevel,
        push_access_level: AccessLevel,
    ) -> Result<(), RemoteError>;

    fn delete_protected_branch(&self, project_id: u64, name: &str) -> Result<(), RemoteError>;

    fn get_protected_tag(&self, project_id: u64, name: &str) -> Result<Option<ProtectedTag>, RemoteError>;

    fn create_protected_tag(
        &self,
        project_id: u64,
        name: &str,
        create_access_level: AccessLevel,
    ) -> Result<(), RemoteError>;

    fn delete_protected_tag(&self, project_id: u64, name: &str) -> Result<(), RemoteError>;

    fn get_member(&self, project_id: u64, user_id: u64) -> Result<Option<Member>, RemoteError>;

    /// Direct members, or all (including inherited) members.
    fn list_members(&self, project_id: u64, inherited: bool) -> Result<Vec<Member>, RemoteError>;

    fn add_member(&self, project_id: u64, user_id: u64, access_level: AccessLevel) -> Result<(), RemoteError>;

    fn update_member(&self, project_id: u64, user_id: u64, access_level: AccessLevel) -> Result<(), RemoteError>;

    fn remove_member(&self, project_id: u64, user_id: u64) -> Result<(), RemoteError>;

    /// Raw file content at `git_ref`, `None` if the file does not exist.
    fn get_file(&self, project_id: u64, git_ref: &str, path: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    /// Commit one file. Creating an existing file yields `BadRequest`.
    fn commit_file(&self, project_id: u64, commit: &FileCommit) -> Result<(), RemoteError>;

    fn list_tags(&self, project_id: u64) -> Result<Vec<Tag>, RemoteError>;

    /// Create a tag. An existing tag yields `BadRequest` ("... already exists").
    fn create_tag(
        &self,
        project_id: u64,
        tag_name: &str,
        git_ref: &str,
        message: Option<&str>,
    ) -> Result<(), RemoteError>;

    /// Commits reachable from `git_ref`, newest first, optionally not after `until`.
    fn list_commits(
        &self,
        project_id: u64,
        git_ref: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Commit>, RemoteError>;

    /// Newest commit from `list_commits` that `accept` takes. Implementations
    /// may stop listing at the first match.
    fn find_commit(
        &self,
        project_id: u64,
        git_ref: &str,
        until: Option<DateTime<Utc>>,
        accept: &dyn Fn(&Commit) -> bool,
    ) -> Result<Option<Commit>, RemoteError> {
        Ok(self
            .list_commits(project_id, git_ref, until)?
            .into_iter()
            .find(|c| accept(c)))
    }

    /// Single commit, including parents and line statistics.
    fn get_commit(&self, project_id: u64, sha: &str) -> Result<Commit, RemoteError>;

    /// Pipelines, newest first; at most `limit` of them when given.
    fn list_pipelines(&self, project_id: u64, limit: Option<usize>) -> Result<Vec<Pipeline>, RemoteError>;

    fn list_pipeline_jobs(&self, project_id: u64, pipeline_id: u64) -> Result<Vec<Job>, RemoteError>;
}

/// Delay before retry `attempt` (1-based), doubling from `base_delay_ms`.
pub fn retry_delay_ms(base_delay_ms: u64, attempt: usize) -> u64 {
    if base_delay_ms == 0 {
        return 0;
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    base_delay_ms.saturating_mul(1_u64 << exponent)
}
