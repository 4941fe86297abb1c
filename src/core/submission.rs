//! GB-009: Submission commit — the last acceptable commit before a deadline.

use super::error::{Error, RemoteError};
use super::types::{Commit, Project};
use crate::transport::RemoteService;
use chrono::{DateTime, Utc};
use regex::Regex;

/// Rejects commits whose author email fully matches a blacklist pattern.
#[derive(Debug, Clone, Default)]
pub struct CommitFilter {
    blacklist: Option<Regex>,
}

impl CommitFilter {
    /// Filter accepting every commit.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Filter from an optional `--blacklist` pattern.
    pub fn from_blacklist(pattern: Option<&str>) -> Result<Self, Error> {
        let blacklist = pattern
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p))
                    .map_err(|e| Error::InvalidOption(format!("blacklist '{}': {}", p, e)))
            })
            .transpose()?;
        Ok(Self { blacklist })
    }

    pub fn accepts(&self, commit: &Commit) -> bool {
        match &self.blacklist {
            Some(re) => !re.is_match(&commit.author_email),
            None => true,
        }
    }
}

/// Resolve the commit that counts as the submission.
///
/// A `prefer_tag` pointing at a commit not after `deadline` wins. Otherwise
/// the newest commit on `branch` up to `deadline` that passes `filter`.
/// `None` when nothing qualifies (including a branch that does not exist).
pub fn resolve_submission_commit(
    remote: &dyn RemoteService,
    project: &Project,
    branch: &str,
    deadline: DateTime<Utc>,
    filter: &CommitFilter,
    prefer_tag: Option<&str>,
) -> Result<Option<Commit>, RemoteError> {
    if let Some(tag_name) = prefer_tag {
        let tagged = remote
            .list_tags(project.id)?
            .into_iter()
            .find(|t| t.name == tag_name);
        match tagged {
            Some(tag) if tag.commit.created_at <= deadline => {
                return remote.get_commit(project.id, &tag.commit.id).map(Some);
            }
            Some(tag) => tracing::debug!(
                "Tag {} in {} is after the deadline ({}), using {}",
                tag_name,
                project.path_with_namespace,
                tag.commit.created_at,
                branch
            ),
            None => tracing::debug!("Tag {} not found in {}", tag_name, project.path_with_namespace),
        }
    }

    match remote.find_commit(project.id, branch, Some(deadline), &|c: &Commit| filter.accepts(c)) {
        Err(e) if e.is_not_found() => Ok(None),
        found => found,
    }
}
