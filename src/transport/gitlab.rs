//! GB-011: GitLab v4 REST client (blocking).
//!
//! Retries connection failures, timeouts, 429 and 5xx responses with
//! exponential backoff. Project paths and file paths are sent as single
//! percent-encoded path segments, as the API requires.

use super::{retry_delay_ms, RemoteService};
use crate::core::config::InstanceConfig;
use crate::core::error::RemoteError;
use crate::core::types::*;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const PER_PAGE: usize = 100;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Client for one GitLab instance.
pub struct GitLabClient {
    http: Client,
    api_base: Url,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GitLabClient {
    pub fn new(instance: &InstanceConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = instance.private_token.as_deref() {
            headers.insert("PRIVATE-TOKEN", header_value(token)?);
        } else if let Some(token) = instance.oauth_token.as_deref() {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                header_value(&format!("Bearer {}", token.trim()))?,
            );
        }

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("gitlab-batch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(instance.timeout_secs.max(1)))
            .build()
            .map_err(|e| transport_error("build client", &e))?;

        let base = format!("{}/api/v4", instance.url.trim_end_matches('/'));
        let api_base = Url::parse(&base).map_err(|e| RemoteError::Transport {
            operation: "parse instance url".to_string(),
            message: format!("{}: {}", base, e),
        })?;

        Ok(Self {
            http,
            api_base,
            retry_max_attempts: instance.retries.max(1),
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
        })
    }

    /// API URL from path segments; each segment is percent-encoded on its own.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send with retries and map non-success statuses onto [`RemoteError`].
    fn send<F>(&self, operation: &str, mut request: F) -> Result<Response, RemoteError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match request().send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if attempt < self.retry_max_attempts && is_retryable_status(status) {
                        tracing::warn!(
                            "{} returned {}, will retry (attempt {}/{})",
                            operation,
                            status.as_u16(),
                            attempt,
                            self.retry_max_attempts
                        );
                        self.pause(attempt);
                        continue;
                    }
                    let body = response.text().unwrap_or_default();
                    return Err(status_error(operation, status, &body));
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && (error.is_connect() || error.is_timeout()) {
                        tracing::warn!("{} failed ({}), will retry", operation, error);
                        self.pause(attempt);
                        continue;
                    }
                    return Err(transport_error(operation, &error));
                }
            }
        }
    }

    fn pause(&self, attempt: usize) {
        let delay = retry_delay_ms(self.retry_base_delay_ms, attempt);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let url = self.url(segments);
        tracing::debug!("GET {}", url);
        let response = self.send(operation, || self.http.get(url.clone()).query(query))?;
        decode(operation, response)
    }

    fn get_optional<T: DeserializeOwned>(
        &self,
        operation: &str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Option<T>, RemoteError> {
        match self.get_json(operation, segments, query) {
            Ok(value) => Ok(Some(value)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Hand pages of `per_page` rows to `visit` until it returns `false`.
    fn for_each_page<T, F>(
        &self,
        operation: &str,
        segments: &[&str],
        query: &[(&str, String)],
        per_page: usize,
        visit: F,
    ) -> Result<(), RemoteError>
    where
        T: DeserializeOwned,
        F: FnMut(Vec<T>) -> bool,
    {
        walk_pages(
            per_page,
            |page| {
                let mut paged: Vec<(&str, String)> = query.to_vec();
                paged.push(("per_page", per_page.to_string()));
                paged.push(("page", page.to_string()));
                self.get_json(operation, segments, &paged)
            },
            visit,
        )
    }

    /// Fetch every page of a list endpoint.
    fn get_all<T: DeserializeOwned>(
        &self,
        operation: &str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let mut rows = Vec::new();
        self.for_each_page(operation, segments, query, PER_PAGE, |chunk: Vec<T>| {
            rows.extend(chunk);
            true
        })?;
        Ok(rows)
    }

    /// First `limit` rows of a list endpoint; later pages are not fetched.
    fn get_first<T: DeserializeOwned>(
        &self,
        operation: &str,
        segments: &[&str],
        query: &[(&str, String)],
        limit: usize,
    ) -> Result<Vec<T>, RemoteError> {
        let mut rows = Vec::new();
        self.for_each_page(operation, segments, query, limit.clamp(1, PER_PAGE), |chunk: Vec<T>| {
            rows.extend(chunk);
            rows.len() < limit
        })?;
        rows.truncate(limit);
        Ok(rows)
    }

    fn write(
        &self,
        method: Method,
        operation: &str,
        segments: &[&str],
        body: Option<&serde_json::Value>,
    ) -> Result<Response, RemoteError> {
        let url = self.url(segments);
        tracing::debug!("{} {}", method, url);
        self.send(operation, || {
            let request = self.http.request(method.clone(), url.clone());
            match body {
                Some(body) => request.json(body),
                None => request,
            }
        })
    }
}

/// Fetch page 1, 2, ... and pass each to `visit`. Stops when `visit`
/// returns `false` or a page has fewer than `per_page` rows.
fn walk_pages<T, E>(
    per_page: usize,
    mut fetch: impl FnMut(u32) -> Result<Vec<T>, E>,
    mut visit: impl FnMut(Vec<T>) -> bool,
) -> Result<(), E> {
    let mut page = 1_u32;
    loop {
        let chunk = fetch(page)?;
        let last = chunk.len() < per_page;
        if !visit(chunk) || last {
            return Ok(());
        }
        page = page.saturating_add(1);
    }
}

fn commits_query(git_ref: &str, until: Option<DateTime<Utc>>) -> Vec<(&'static str, String)> {
    let mut query = vec![("ref_name", git_ref.to_string())];
    if let Some(until) = until {
        query.push(("until", until.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    query
}

fn header_value(value: &str) -> Result<HeaderValue, RemoteError> {
    HeaderValue::from_str(value.trim()).map_err(|e| RemoteError::Transport {
        operation: "build auth header".to_string(),
        message: e.to_string(),
    })
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn status_error(operation: &str, status: StatusCode, body: &str) -> RemoteError {
    let message = api_message(body);
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(format!("{}: {}", operation, message)),
        StatusCode::CONFLICT => RemoteError::Conflict(format!("{}: {}", operation, message)),
        StatusCode::BAD_REQUEST => RemoteError::BadRequest(message),
        StatusCode::NOT_MODIFIED => RemoteError::NotModified(operation.to_string()),
        _ => RemoteError::Http {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull `message`/`error` out of a GitLab error body, else truncate the raw body.
fn api_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
    }
    body.chars().take(240).collect()
}

fn transport_error(operation: &str, error: &reqwest::Error) -> RemoteError {
    RemoteError::Transport {
        operation: operation.to_string(),
        message: error.to_string(),
    }
}

fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T, RemoteError> {
    response.json::<T>().map_err(|e| RemoteError::Decode {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}

#[derive(Deserialize)]
struct RepositoryFile {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// Decode the `content` of a repository file response.
fn decode_file_content(file: RepositoryFile) -> Result<Vec<u8>, RemoteError> {
    match file.encoding.as_deref() {
        Some("base64") | None => base64::engine::general_purpose::STANDARD
            .decode(file.content.replace('\n', ""))
            .map_err(|e| RemoteError::Decode {
                operation: "get file".to_string(),
                message: e.to_string(),
            }),
        Some(_) => Ok(file.content.into_bytes()),
    }
}

impl RemoteService for GitLabClient {
    fn find_users(&self, login: &str) -> Result<Vec<Account>, RemoteError> {
        self.get_json("find users", &["users"], &[("username", login.to_string())])
    }

    fn get_project(&self, path_or_id: &str) -> Result<Project, RemoteError> {
        self.get_json("get project", &["projects", path_or_id], &[])
    }

    fn fork_project(&self, parent_id: u64, namespace: &str, name: &str) -> Result<Project, RemoteError> {
        let id = parent_id.to_string();
        let body = json!({ "namespace_path": namespace, "path": name, "name": name });
        let response = self.write(Method::POST, "fork project", &["projects", &id, "fork"], Some(&body))?;
        decode("fork project", response)
    }

    fn delete_fork_relation(&self, project_id: u64) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        self.write(Method::DELETE, "delete fork relation", &["projects", &id, "fork"], None)?;
        Ok(())
    }

    fn update_project(
        &self,
        project_id: u64,
        changes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        let body = serde_json::Value::Object(changes.clone());
        self.write(Method::PUT, "update project", &["projects", &id], Some(&body))?;
        Ok(())
    }

    fn get_protected_branch(&self, project_id: u64, name: &str) -> Result<Option<ProtectedBranch>, RemoteError> {
        let id = project_id.to_string();
        self.get_optional("get protected branch", &["projects", &id, "protected_branches", name], &[])
    }

    fn create_protected_branch(
        &self,
        project_id: u64,
        name: &str,
        merge_access_level: AccessLevel,
        push_access_level: AccessLevel,
    ) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        let body = json!({
            "name": name,
            "merge_access_level": merge_access_level.value(),
            "push_access_level": push_access_level.value(),
        });
        self.write(Method::POST, "protect branch", &["projects", &id, "protected_branches"], Some(&body))?;
        Ok(())
    }

    fn delete_protected_branch(&self, project_id: u64, name: &str) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        self.write(Method::DELETE, "unprotect branch", &["projects", &id, "protected_branches", name], None)?;
        Ok(())
    }

    fn get_protected_tag(&self, project_id: u64, name: &str) -> Result<Option<ProtectedTag>, RemoteError> {
        let id = project_id.to_string();
        self.get_optional("get protected tag", &["projects", &id, "protected_tags", name], &[])
    }

    fn create_protected_tag(
        &self,
        project_id: u64,
        name: &str,
        create_access_level: AccessLevel,
    ) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        let body = json!({ "name": name, "create_access_level": create_access_level.value() });
        self.write(Method::POST, "protect tag", &["projects", &id, "protected_tags"], Some(&body))?;
        Ok(())
    }

    fn delete_protected_tag(&self, project_id: u64, name: &str) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        self.write(Method::DELETE, "unprotect tag", &["projects", &id, "protected_tags", name], None)?;
        Ok(())
    }

    fn get_member(&self, project_id: u64, user_id: u64) -> Result<Option<Member>, RemoteError> {
        let (id, user) = (project_id.to_string(), user_id.to_string());
        self.get_optional("get member", &["projects", &id, "members", &user], &[])
    }

    fn list_members(&self, project_id: u64, inherited: bool) -> Result<Vec<Member>, RemoteError> {
        let id = project_id.to_string();
        if inherited {
            self.get_all("list members", &["projects", &id, "members", "all"], &[])
        } else {
            self.get_all("list members", &["projects", &id, "members"], &[])
        }
    }

    fn add_member(&self, project_id: u64, user_id: u64, access_level: AccessLevel) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        let body = json!({ "user_id": user_id, "access_level": access_level.value() });
        self.write(Method::POST, "add member", &["projects", &id, "members"], Some(&body))?;
        Ok(())
    }

    fn update_member(&self, project_id: u64, user_id: u64, access_level: AccessLevel) -> Result<(), RemoteError> {
        let (id, user) = (project_id.to_string(), user_id.to_string());
        let body = json!({ "access_level": access_level.value() });
        self.write(Method::PUT, "update member", &["projects", &id, "members", &user], Some(&body))?;
        Ok(())
    }

    fn remove_member(&self, project_id: u64, user_id: u64) -> Result<(), RemoteError> {
        let (id, user) = (project_id.to_string(), user_id.to_string());
        self.write(Method::DELETE, "remove member", &["projects", &id, "members", &user], None)?;
        Ok(())
    }

    fn get_file(&self, project_id: u64, git_ref: &str, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let id = project_id.to_string();
        let file: Option<RepositoryFile> = self.get_optional(
            "get file",
            &["projects", &id, "repository", "files", path],
            &[("ref", git_ref.to_string())],
        )?;
        file.map(decode_file_content).transpose()
    }

    fn commit_file(&self, project_id: u64, commit: &FileCommit) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        let body = json!({
            "branch": commit.branch,
            "commit_message": commit.message,
            "actions": [{
                "action": commit.action,
                "file_path": commit.file_path,
                "content": commit.content,
            }],
        });
        self.write(Method::POST, "commit file", &["projects", &id, "repository", "commits"], Some(&body))?;
        Ok(())
    }

    fn list_tags(&self, project_id: u64) -> Result<Vec<Tag>, RemoteError> {
        let id = project_id.to_string();
        self.get_all("list tags", &["projects", &id, "repository", "tags"], &[])
    }

    fn create_tag(
        &self,
        project_id: u64,
        tag_name: &str,
        git_ref: &str,
        message: Option<&str>,
    ) -> Result<(), RemoteError> {
        let id = project_id.to_string();
        let mut body = json!({ "tag_name": tag_name, "ref": git_ref });
        if let Some(message) = message {
            body["message"] = json!(message);
        }
        self.write(Method::POST, "create tag", &["projects", &id, "repository", "tags"], Some(&body))?;
        Ok(())
    }

    fn list_commits(
        &self,
        project_id: u64,
        git_ref: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Commit>, RemoteError> {
        let id = project_id.to_string();
        let query = commits_query(git_ref, until);
        self.get_all("list commits", &["projects", &id, "repository", "commits"], &query)
    }

    fn find_commit(
        &self,
        project_id: u64,
        git_ref: &str,
        until: Option<DateTime<Utc>>,
        accept: &dyn Fn(&Commit) -> bool,
    ) -> Result<Option<Commit>, RemoteError> {
        let id = project_id.to_string();
        let query = commits_query(git_ref, until);
        let mut found = None;
        self.for_each_page(
            "list commits",
            &["projects", &id, "repository", "commits"],
            &query,
            PER_PAGE,
            |chunk: Vec<Commit>| {
                found = chunk.into_iter().find(|c| accept(c));
                found.is_none()
            },
        )?;
        Ok(found)
    }

    fn get_commit(&self, project_id: u64, sha: &str) -> Result<Commit, RemoteError> {
        let id = project_id.to_string();
        self.get_json("get commit", &["projects", &id, "repository", "commits", sha], &[])
    }

    fn list_pipelines(&self, project_id: u64, limit: Option<usize>) -> Result<Vec<Pipeline>, RemoteError> {
        let id = project_id.to_string();
        let segments = ["projects", id.as_str(), "pipelines"];
        match limit {
            Some(limit) => self.get_first("list pipelines", &segments, &[], limit),
            None => self.get_all("list pipelines", &segments, &[]),
        }
    }

    fn list_pipeline_jobs(&self, project_id: u64, pipeline_id: u64) -> Result<Vec<Job>, RemoteError> {
        let (id, pipeline) = (project_id.to_string(), pipeline_id.to_string());
        self.get_all("list jobs", &["projects", &id, "pipelines", &pipeline, "jobs"], &[])
    }
}
