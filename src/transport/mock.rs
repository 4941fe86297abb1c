//! In-memory [`RemoteService`] for tests. Records every call.

use super::RemoteService;
use crate::core::error::RemoteError;
use crate::core::types::*;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Default)]
struct MockState {
    users: Vec<Account>,
    projects: Vec<Project>,
    pending_imports: HashMap<u64, u32>,
    fork_relations: HashSet<u64>,
    protected_branches: HashMap<(u64, String), ProtectedBranch>,
    protected_tags: HashMap<(u64, String), ProtectedTag>,
    members: BTreeMap<(u64, u64), Member>,
    inherited_members: BTreeMap<(u64, u64), Member>,
    files: HashMap<(u64, String, String), Vec<u8>>,
    tags: HashMap<u64, Vec<Tag>>,
    commits: HashMap<(u64, String), Vec<Commit>>,
    pipelines: HashMap<u64, Vec<Pipeline>>,
    jobs: HashMap<u64, Vec<Job>>,
    failing: HashSet<&'static str>,
    next_id: u64,
}

/// Fake GitLab. Configure with the `with_*` builders, inspect with
/// [`MockRemote::calls`] / [`MockRemote::mutations`].
#[derive(Default)]
pub struct MockRemote {
    state: RefCell<MockState>,
    calls: RefCell<Vec<String>>,
}

fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| panic!("bad timestamp {value}: {e}"))
}

impl MockRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.state.borrow_mut().next_id = 1000;
        remote
    }

    pub fn with_user(self, id: u64, username: &str) -> Self {
        self.state.borrow_mut().users.push(Account {
            id,
            username: username.to_string(),
            name: format!("User {}", username),
        });
        self
    }

    pub fn with_project(self, id: u64, path: &str) -> Self {
        self.state.borrow_mut().projects.push(Project {
            id,
            path_with_namespace: path.to_string(),
            empty_repo: false,
            ssh_url_to_repo: Some(format!("git@gitlab.example.org:{}.git", path)),
            default_branch: None,
            description: None,
            mr_default_target_self: None,
            squash_option: None,
        });
        self
    }

    pub fn with_project_settings(
        self,
        id: u64,
        description: Option<&str>,
        mr_default_target_self: Option<bool>,
        squash_option: Option<&str>,
    ) -> Self {
        {
            let mut state = self.state.borrow_mut();
            if let Some(p) = state.projects.iter_mut().find(|p| p.id == id) {
                p.description = description.map(str::to_string);
                p.mr_default_target_self = mr_default_target_self;
                p.squash_option = squash_option.map(str::to_string);
            }
        }
        self
    }

    /// New forks stay `empty_repo` for this many `get_project` calls.
    pub fn with_import_delay(self, polls: u32) -> Self {
        self.state.borrow_mut().pending_imports.insert(0, polls);
        self
    }

    pub fn with_fork_relation(self, project_id: u64) -> Self {
        self.state.borrow_mut().fork_relations.insert(project_id);
        self
    }

    pub fn with_protected_branch(self, project_id: u64, name: &str, merge: AccessLevel, push: AccessLevel) -> Self {
        self.state.borrow_mut().protected_branches.insert(
            (project_id, name.to_string()),
            ProtectedBranch {
                name: name.to_string(),
                merge_access_levels: vec![AccessLevelGrant { access_level: merge }],
                push_access_levels: vec![AccessLevelGrant { access_level: push }],
            },
        );
        self
    }

    pub fn with_protected_tag(self, project_id: u64, name: &str, create: AccessLevel) -> Self {
        self.state.borrow_mut().protected_tags.insert(
            (project_id, name.to_string()),
            ProtectedTag {
                name: name.to_string(),
                create_access_levels: vec![AccessLevelGrant { access_level: create }],
            },
        );
        self
    }

    pub fn with_member(self, project_id: u64, user_id: u64, username: &str, level: AccessLevel) -> Self {
        self.state
            .borrow_mut()
            .members
            .insert((project_id, user_id), member(user_id, username, level));
        self
    }

    /// Member visible only through the inherited listing.
    pub fn with_inherited_member(self, project_id: u64, user_id: u64, username: &str, level: AccessLevel) -> Self {
        self.state
            .borrow_mut()
            .inherited_members
            .insert((project_id, user_id), member(user_id, username, level));
        self
    }

    pub fn with_file(self, project_id: u64, git_ref: &str, path: &str, content: &str) -> Self {
        self.state.borrow_mut().files.insert(
            (project_id, git_ref.to_string(), path.to_string()),
            content.as_bytes().to_vec(),
        );
        self
    }

    /// Add a commit on `branch`; commits are kept newest first.
    pub fn with_commit(self, project_id: u64, branch: &str, id: &str, author_email: &str, created_at: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let commits = state.commits.entry((project_id, branch.to_string())).or_default();
            let created_at = ts(created_at);
            commits.push(Commit {
                id: id.to_string(),
                short_id: id.chars().take(8).collect(),
                title: format!("commit {}", id),
                message: format!("commit {}\n", id),
                author_name: author_email.split('@').next().unwrap_or_default().to_string(),
                author_email: author_email.to_string(),
                authored_date: Some(created_at),
                committed_date: Some(created_at),
                created_at,
                web_url: format!("https://gitlab.example.org/-/commit/{}", id),
                parent_ids: Vec::new(),
                stats: None,
            });
            commits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        self
    }

    /// Parents and line counts reported by `get_commit` for `id`.
    pub fn with_commit_stats(self, project_id: u64, id: &str, parents: &[&str], additions: u64, deletions: u64) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let found = state
                .commits
                .iter_mut()
                .filter(|((pid, _), _)| *pid == project_id)
                .flat_map(|(_, commits)| commits.iter_mut())
                .filter(|c| c.id == id);
            for commit in found {
                commit.parent_ids = parents.iter().map(|p| p.to_string()).collect();
                commit.stats = Some(CommitStats {
                    additions,
                    deletions,
                    total: additions + deletions,
                });
            }
        }
        self
    }

    pub fn with_tag(self, project_id: u64, name: &str, commit_id: &str, created_at: &str) -> Self {
        self.state.borrow_mut().tags.entry(project_id).or_default().push(Tag {
            name: name.to_string(),
            commit: TagCommit {
                id: commit_id.to_string(),
                created_at: ts(created_at),
            },
        });
        self
    }

    /// Add a pipeline; add them newest first.
    pub fn with_pipeline(self, project_id: u64, id: u64, status: &str, sha: &str, jobs: &[(u64, &str, &str)]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.pipelines.entry(project_id).or_default().push(Pipeline {
                id,
                status: status.to_string(),
                sha: sha.to_string(),
            });
            state.jobs.insert(
                id,
                jobs.iter()
                    .map(|(job_id, status, name)| Job {
                        id: *job_id,
                        status: status.to_string(),
                        name: name.to_string(),
                    })
                    .collect(),
            );
        }
        self
    }

    /// Make every call of `operation` fail with HTTP 500.
    pub fn fail_on(self, operation: &'static str) -> Self {
        self.state.borrow_mut().failing.insert(operation);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Calls that change remote state.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !(c.starts_with("get_") || c.starts_with("list_") || c.starts_with("find_")))
            .collect()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        let prefix = format!("{} ", operation);
        self.calls.borrow().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn project(&self, path: &str) -> Option<Project> {
        self.state
            .borrow()
            .projects
            .iter()
            .find(|p| p.path_with_namespace == path)
            .cloned()
    }

    pub fn protected_branch(&self, project_id: u64, name: &str) -> Option<ProtectedBranch> {
        self.state
            .borrow()
            .protected_branches
            .get(&(project_id, name.to_string()))
            .cloned()
    }

    pub fn member(&self, project_id: u64, user_id: u64) -> Option<Member> {
        self.state.borrow().members.get(&(project_id, user_id)).cloned()
    }

    pub fn file(&self, project_id: u64, git_ref: &str, path: &str) -> Option<String> {
        self.state
            .borrow()
            .files
            .get(&(project_id, git_ref.to_string(), path.to_string()))
            .map(|c| String::from_utf8_lossy(c).to_string())
    }

    pub fn has_fork_relation(&self, project_id: u64) -> bool {
        self.state.borrow().fork_relations.contains(&project_id)
    }

    fn record(&self, operation: &'static str, detail: String) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(format!("{} {}", operation, detail));
        if self.state.borrow().failing.contains(operation) {
            return Err(RemoteError::Http {
                operation: operation.to_string(),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn username(&self, user_id: u64) -> String {
        self.state
            .borrow()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| format!("user{}", user_id))
    }
}

fn member(id: u64, username: &str, level: AccessLevel) -> Member {
    Member {
        id,
        username: username.to_string(),
        name: format!("User {}", username),
        access_level: level,
    }
}

impl RemoteService for MockRemote {
    fn find_users(&self, login: &str) -> Result<Vec<Account>, RemoteError> {
        self.record("find_users", login.to_string())?;
        Ok(self
            .state
            .borrow()
            .users
            .iter()
            .filter(|u| u.username == login)
            .cloned()
            .collect())
    }

    fn get_project(&self, path_or_id: &str) -> Result<Project, RemoteError> {
        self.record("get_project", path_or_id.to_string())?;
        let mut state = self.state.borrow_mut();
        let mut project = state
            .projects
            .iter()
            .find(|p| p.path_with_namespace == path_or_id || p.id.to_string() == path_or_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("project {}", path_or_id)))?;
        if let Some(remaining) = state.pending_imports.get_mut(&project.id) {
            project.empty_repo = *remaining > 0;
            *remaining = remaining.saturating_sub(1);
        }
        Ok(project)
    }

    fn fork_project(&self, parent_id: u64, namespace: &str, name: &str) -> Result<Project, RemoteError> {
        let path = format!("{}/{}", namespace, name);
        self.record("fork_project", format!("{} {}", parent_id, path))?;
        let mut state = self.state.borrow_mut();
        if state.projects.iter().any(|p| p.path_with_namespace == path) {
            return Err(RemoteError::Conflict(format!("{} has already been taken", path)));
        }
        state.next_id += 1;
        let id = state.next_id;
        let delay = state.pending_imports.get(&0).copied().unwrap_or(0);
        if delay > 0 {
            state.pending_imports.insert(id, delay);
        }
        let project = Project {
            id,
            path_with_namespace: path.clone(),
            empty_repo: delay > 0,
            ssh_url_to_repo: Some(format!("git@gitlab.example.org:{}.git", path)),
            default_branch: None,
            description: None,
            mr_default_target_self: None,
            squash_option: None,
        };
        state.projects.push(project.clone());
        state.fork_relations.insert(id);
        Ok(project)
    }

    fn delete_fork_relation(&self, project_id: u64) -> Result<(), RemoteError> {
        self.record("delete_fork_relation", project_id.to_string())?;
        if self.state.borrow_mut().fork_relations.remove(&project_id) {
            Ok(())
        } else {
            Err(RemoteError::NotModified("delete fork relation".to_string()))
        }
    }

    fn update_project(
        &self,
        project_id: u64,
        changes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), RemoteError> {
        let mut keys: Vec<&str> = changes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        self.record("update_project", format!("{} {}", project_id, keys.join(",")))?;
        let mut state = self.state.borrow_mut();
        let project = state
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| RemoteError::NotFound(format!("project {}", project_id)))?;
        for (key, value) in changes {
            match key.as_str() {
                "description" => project.description = value.as_str().map(str::to_string),
                "mr_default_target_self" => project.mr_default_target_self = value.as_bool(),
                "squash_option" => project.squash_option = value.as_str().map(str::to_string),
                other => return Err(RemoteError::BadRequest(format!("unknown attribute {}", other))),
            }
        }
        Ok(())
    }

    fn get_protected_branch(&self, project_id: u64, name: &str) -> Result<Option<ProtectedBranch>, RemoteError> {
        self.record("get_protected_branch", format!("{} {}", project_id, name))?;
        Ok(self.protected_branch(project_id, name))
    }

    fn create_protected_branch(
        &self,
        project_id: u64,
        name: &str,
        merge_access_level: AccessLevel,
        push_access_level: AccessLevel,
    ) -> Result<(), RemoteError> {
        self.record(
            "create_protected_branch",
            format!("{} {} merge={} push={}", project_id, name, merge_access_level, push_access_level),
        )?;
        let key = (project_id, name.to_string());
        let mut state = self.state.borrow_mut();
        if state.protected_branches.contains_key(&key) {
            return Err(RemoteError::Conflict(format!("protected branch {} already exists", name)));
        }
        state.protected_branches.insert(
            key,
            ProtectedBranch {
                name: name.to_string(),
                merge_access_levels: vec![AccessLevelGrant { access_level: merge_access_level }],
                push_access_levels: vec![AccessLevelGrant { access_level: push_access_level }],
            },
        );
        Ok(())
    }

    fn delete_protected_branch(&self, project_id: u64, name: &str) -> Result<(), RemoteError> {
        self.record("delete_protected_branch", format!("{} {}", project_id, name))?;
        self.state
            .borrow_mut()
            .protected_branches
            .remove(&(project_id, name.to_string()))
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("protected branch {}", name)))
    }

    fn get_protected_tag(&self, project_id: u64, name: &str) -> Result<Option<ProtectedTag>, RemoteError> {
        self.record("get_protected_tag", format!("{} {}", project_id, name))?;
        Ok(self
            .state
            .borrow()
            .protected_tags
            .get(&(project_id, name.to_string()))
            .cloned())
    }

    fn create_protected_tag(
        &self,
        project_id: u64,
        name: &str,
        create_access_level: AccessLevel,
    ) -> Result<(), RemoteError> {
        self.record(
            "create_protected_tag",
            format!("{} {} create={}", project_id, name, create_access_level),
        )?;
        let key = (project_id, name.to_string());
        let mut state = self.state.borrow_mut();
        if state.protected_tags.contains_key(&key) {
            return Err(RemoteError::Conflict(format!("protected tag {} already exists", name)));
        }
        state.protected_tags.insert(
            key,
            ProtectedTag {
                name: name.to_string(),
                create_access_levels: vec![AccessLevelGrant { access_level: create_access_level }],
            },
        );
        Ok(())
    }

    fn delete_protected_tag(&self, project_id: u64, name: &str) -> Result<(), RemoteError> {
        self.record("delete_protected_tag", format!("{} {}", project_id, name))?;
        self.state
            .borrow_mut()
            .protected_tags
            .remove(&(project_id, name.to_string()))
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("protected tag {}", name)))
    }

    fn get_member(&self, project_id: u64, user_id: u64) -> Result<Option<Member>, RemoteError> {
        self.record("get_member", format!("{} {}", project_id, user_id))?;
        Ok(self.member(project_id, user_id))
    }

    fn list_members(&self, project_id: u64, inherited: bool) -> Result<Vec<Member>, RemoteError> {
        self.record("list_members", format!("{} inherited={}", project_id, inherited))?;
        let state = self.state.borrow();
        let mut members: Vec<Member> = state
            .members
            .iter()
            .filter(|((pid, _), _)| *pid == project_id)
            .map(|(_, m)| m.clone())
            .collect();
        if inherited {
            members.extend(
                state
                    .inherited_members
                    .iter()
                    .filter(|((pid, _), _)| *pid == project_id)
                    .map(|(_, m)| m.clone()),
            );
        }
        Ok(members)
    }

    fn add_member(&self, project_id: u64, user_id: u64, access_level: AccessLevel) -> Result<(), RemoteError> {
        self.record("add_member", format!("{} {} {}", project_id, user_id, access_level))?;
        let username = self.username(user_id);
        let mut state = self.state.borrow_mut();
        if state.members.contains_key(&(project_id, user_id)) {
            return Err(RemoteError::Conflict("Member already exists".to_string()));
        }
        state
            .members
            .insert((project_id, user_id), member(user_id, &username, access_level));
        Ok(())
    }

    fn update_member(&self, project_id: u64, user_id: u64, access_level: AccessLevel) -> Result<(), RemoteError> {
        self.record("update_member", format!("{} {} {}", project_id, user_id, access_level))?;
        let mut state = self.state.borrow_mut();
        let existing = state
            .members
            .get_mut(&(project_id, user_id))
            .ok_or_else(|| RemoteError::NotFound(format!("member {}", user_id)))?;
        existing.access_level = access_level;
        Ok(())
    }

    fn remove_member(&self, project_id: u64, user_id: u64) -> Result<(), RemoteError> {
        self.record("remove_member", format!("{} {}", project_id, user_id))?;
        self.state
            .borrow_mut()
            .members
            .remove(&(project_id, user_id))
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("member {}", user_id)))
    }

    fn get_file(&self, project_id: u64, git_ref: &str, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        self.record("get_file", format!("{} {} {}", project_id, git_ref, path))?;
        Ok(self
            .state
            .borrow()
            .files
            .get(&(project_id, git_ref.to_string(), path.to_string()))
            .cloned())
    }

    fn commit_file(&self, project_id: u64, commit: &FileCommit) -> Result<(), RemoteError> {
        let action = match commit.action {
            FileAction::Create => "create",
            FileAction::Update => "update",
        };
        self.record(
            "commit_file",
            format!("{} {} {} {}", project_id, commit.branch, commit.file_path, action),
        )?;
        let key = (project_id, commit.branch.clone(), commit.file_path.clone());
        let mut state = self.state.borrow_mut();
        match (commit.action, state.files.contains_key(&key)) {
            (FileAction::Create, true) => {
                return Err(RemoteError::BadRequest("A file with this name already exists".to_string()))
            }
            (FileAction::Update, false) => {
                return Err(RemoteError::BadRequest("A file with this name doesn't exist".to_string()))
            }
            _ => {}
        }
        state.files.insert(key, commit.content.as_bytes().to_vec());
        Ok(())
    }

    fn list_tags(&self, project_id: u64) -> Result<Vec<Tag>, RemoteError> {
        self.record("list_tags", project_id.to_string())?;
        Ok(self.state.borrow().tags.get(&project_id).cloned().unwrap_or_default())
    }

    fn create_tag(
        &self,
        project_id: u64,
        tag_name: &str,
        git_ref: &str,
        _message: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.record("create_tag", format!("{} {} {}", project_id, tag_name, git_ref))?;
        let mut state = self.state.borrow_mut();
        let tags = state.tags.entry(project_id).or_default();
        if tags.iter().any(|t| t.name == tag_name) {
            return Err(RemoteError::BadRequest(format!("Tag {} already exists", tag_name)));
        }
        tags.push(Tag {
            name: tag_name.to_string(),
            commit: TagCommit {
                id: git_ref.to_string(),
                created_at: Utc::now(),
            },
        });
        Ok(())
    }

    fn list_commits(
        &self,
        project_id: u64,
        git_ref: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Commit>, RemoteError> {
        self.record("list_commits", format!("{} {}", project_id, git_ref))?;
        let state = self.state.borrow();
        let commits = state
            .commits
            .get(&(project_id, git_ref.to_string()))
            .ok_or_else(|| RemoteError::NotFound(format!("branch {}", git_ref)))?;
        Ok(commits
            .iter()
            .filter(|c| until.map_or(true, |u| c.created_at <= u))
            .map(|c| Commit {
                stats: None,
                ..c.clone()
            })
            .collect())
    }

    fn get_commit(&self, project_id: u64, sha: &str) -> Result<Commit, RemoteError> {
        self.record("get_commit", format!("{} {}", project_id, sha))?;
        self.state
            .borrow()
            .commits
            .iter()
            .filter(|((pid, _), _)| *pid == project_id)
            .flat_map(|(_, commits)| commits.iter())
            .find(|c| c.id == sha || c.id.starts_with(sha))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("commit {}", sha)))
    }

    fn list_pipelines(&self, project_id: u64, limit: Option<usize>) -> Result<Vec<Pipeline>, RemoteError> {
        let detail = match limit {
            Some(limit) => format!("{} limit={}", project_id, limit),
            None => project_id.to_string(),
        };
        self.record("list_pipelines", detail)?;
        let mut pipelines = self.state.borrow().pipelines.get(&project_id).cloned().unwrap_or_default();
        if let Some(limit) = limit {
            pipelines.truncate(limit);
        }
        Ok(pipelines)
    }

    fn list_pipeline_jobs(&self, project_id: u64, pipeline_id: u64) -> Result<Vec<Job>, RemoteError> {
        self.record("list_pipeline_jobs", format!("{} {}", project_id, pipeline_id))?;
        Ok(self.state.borrow().jobs.get(&pipeline_id).cloned().unwrap_or_default())
    }
}
