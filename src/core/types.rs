//! GB-002: Domain types — entries, access levels, remote objects, plan actions.
//!
//! Remote objects mirror the subset of the GitLab v4 REST payloads the
//! commands need. All of them derive Deserialize so the HTTP client can
//! decode responses directly.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::Error;

// ============================================================================
// Entries (CSV rows)
// ============================================================================

/// One input row: column name → value, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    columns: IndexMap<String, String>,
}

impl Entry {
    pub fn new(columns: IndexMap<String, String>) -> Self {
        Self { columns }
    }

    /// Build an entry from literal pairs (mostly for tests and demos).
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Short label for diagnostics: the login if present, else the first column.
    pub fn label(&self, login_column: &str) -> String {
        self.get(login_column)
            .or_else(|| self.columns.values().next().map(String::as_str))
            .unwrap_or("<empty row>")
            .to_string()
    }
}

impl AsRef<Entry> for Entry {
    fn as_ref(&self) -> &Entry {
        self
    }
}

/// The loaded roster. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Entries {
    header: Vec<String>,
    rows: Vec<Entry>,
}

impl Entries {
    pub fn new(header: Vec<String>, rows: Vec<Entry>) -> Self {
        Self { header, rows }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<Vec<Entry>> for Entries {
    fn from(rows: Vec<Entry>) -> Self {
        let header = rows
            .first()
            .map(|e| e.columns().map(|(k, _)| k.to_string()).collect())
            .unwrap_or_default();
        Self { header, rows }
    }
}

impl<'a> IntoIterator for &'a Entries {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// ============================================================================
// Access levels
// ============================================================================

/// GitLab permission tier. Ordered: a higher level includes the lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AccessLevel {
    NoAccess,
    MinimalAccess,
    Guest,
    Planner,
    Reporter,
    Developer,
    Maintainer,
    Owner,
    Admin,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 9] = [
        Self::NoAccess,
        Self::MinimalAccess,
        Self::Guest,
        Self::Planner,
        Self::Reporter,
        Self::Developer,
        Self::Maintainer,
        Self::Owner,
        Self::Admin,
    ];

    /// Numeric value used by the REST API.
    pub fn value(self) -> u32 {
        match self {
            Self::NoAccess => 0,
            Self::MinimalAccess => 5,
            Self::Guest => 10,
            Self::Planner => 15,
            Self::Reporter => 20,
            Self::Developer => 30,
            Self::Maintainer => 40,
            Self::Owner => 50,
            Self::Admin => 60,
        }
    }

    /// Canonical (upper-case) name.
    pub fn name(self) -> &'static str {
        match self {
            Self::NoAccess => "NO_ACCESS",
            Self::MinimalAccess => "MINIMAL_ACCESS",
            Self::Guest => "GUEST",
            Self::Planner => "PLANNER",
            Self::Reporter => "REPORTER",
            Self::Developer => "DEVELOPER",
            Self::Maintainer => "MAINTAINER",
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|l| l.name()).collect()
    }

    pub fn from_value(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.value() == value)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AccessLevel {
    type Err = Error;

    /// Case-insensitive; `-` is accepted in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|l| l.name() == normalized)
            .ok_or_else(|| Error::InvalidAccessLevel(s.to_string()))
    }
}

impl TryFrom<u32> for AccessLevel {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_value(value).ok_or_else(|| format!("unknown access level value {}", value))
    }
}

impl From<AccessLevel> for u32 {
    fn from(level: AccessLevel) -> u32 {
        level.value()
    }
}

// ============================================================================
// Remote objects
// ============================================================================

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
}

/// A project (repository).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
    #[serde(default)]
    pub empty_repo: bool,
    #[serde(default)]
    pub ssh_url_to_repo: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mr_default_target_self: Option<bool>,
    #[serde(default)]
    pub squash_option: Option<String>,
}

/// One entry of `push_access_levels` / `merge_access_levels` / `create_access_levels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLevelGrant {
    pub access_level: AccessLevel,
}

/// A protected branch as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBranch {
    pub name: String,
    #[serde(default)]
    pub push_access_levels: Vec<AccessLevelGrant>,
    #[serde(default)]
    pub merge_access_levels: Vec<AccessLevelGrant>,
}

/// A protected tag as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedTag {
    pub name: String,
    #[serde(default)]
    pub create_access_levels: Vec<AccessLevelGrant>,
}

/// Project membership of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    pub access_level: AccessLevel,
}

/// Added/removed line counts of one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub additions: u64,
    pub deletions: u64,
    pub total: u64,
}

/// A commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default)]
    pub authored_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub committed_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub parent_ids: Vec<String>,
    /// Only single-commit lookups carry it.
    #[serde(default)]
    pub stats: Option<CommitStats>,
}

impl Commit {
    /// Author date, falling back to the creation time.
    pub fn authored_at(&self) -> DateTime<Utc> {
        self.authored_date.unwrap_or(self.created_at)
    }
}

/// Commit reference embedded in a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCommit {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// A repository tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub commit: TagCommit,
}

/// A CI pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub status: String,
    pub sha: String,
}

/// A CI job of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub status: String,
    pub name: String,
}

/// Commit action kind for file uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Update,
}

/// Single-file commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommit {
    pub branch: String,
    pub file_path: String,
    pub content: String,
    pub message: String,
    pub action: FileAction,
}

// ============================================================================
// Plan
// ============================================================================

/// Action the reconciliation engine takes on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Recreate,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Recreate => write!(f, "RECREATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}
