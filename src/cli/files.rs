//! GB-018: File upload/download, cloning and deadline commit commands.

use super::{blacklist_param, branch_param, for_each_project, project_param};
use crate::core::error::{Error, RemoteError};
use crate::core::params::Param;
use crate::core::registry::{Args, Registry};
use crate::core::submission::{resolve_submission_commit, CommitFilter};
use crate::core::template::{expand, expand_with, Extras};
use crate::core::types::{Commit, Entry, FileAction, FileCommit, Project};
use crate::transport::{local, RemoteService};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Printed in place of a commit id when no submission was found.
const UNRESOLVED_COMMIT: &str = "0000000000000000000000000000000000000000";

pub(super) fn register(registry: &mut Registry) {
    registry
        .register(
            "get-file",
            "Download a file from multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                Param::string("remote-file")
                    .required()
                    .metavar("REMOTE_FILENAME_WITH_FORMAT")
                    .help("File path in the repository."),
                Param::string("local-file")
                    .required()
                    .metavar("LOCAL_FILENAME_WITH_FORMAT")
                    .help("Local file path, formatted from CSV columns."),
                branch_param("Repository branch to download from."),
                Param::deadline("deadline"),
                blacklist_param(),
            ],
            cmd_get_file,
        )
        .register(
            "put-file",
            "Upload a file to multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                Param::dry_run(),
                project_param(),
                Param::string("from")
                    .required()
                    .metavar("LOCAL_FILE_WITH_FORMAT")
                    .help("Local file, formatted from CSV columns."),
                Param::string("to")
                    .required()
                    .metavar("REMOTE_FILE_WITH_FORMAT")
                    .help("Path in the repository, formatted from CSV columns."),
                Param::string("branch").default("master").metavar("BRANCH").help("Branch to commit to."),
                Param::string("message")
                    .default("Updating {GL[target_filename]}")
                    .metavar("COMMIT_MESSAGE_WITH_FORMAT")
                    .help("Commit message, formatted from CSV columns."),
                Param::flag("force-commit", "Do not check current file content, always upload."),
                Param::flag("skip-missing-files", "Do not fail when the local file does not exist."),
                Param::flag("once", "Upload only if the file does not exist in the repository yet."),
            ],
            cmd_put_file,
        )
        .register(
            "clone",
            "Clone multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                Param::string("to")
                    .required()
                    .metavar("LOCAL_PATH_WITH_FORMAT")
                    .help("Local repository path, formatted from CSV columns."),
                branch_param("Branch to clone."),
                Param::string("commit")
                    .metavar("COMMIT_WITH_FORMAT")
                    .help("Commit to reset to after clone (overrides --deadline)."),
                Param::deadline("deadline"),
                blacklist_param(),
            ],
            cmd_clone,
        )
        .register(
            "deadline-commit",
            "Get last commits before deadline.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                branch_param("Repository branch to inspect."),
                Param::string("prefer-tag")
                    .metavar("TAG_WITH_FORMAT")
                    .help("Prefer this tag when it points before the deadline."),
                Param::deadline("deadline"),
                blacklist_param(),
                Param::string("first-line")
                    .default("login,commit")
                    .metavar("OUTPUT_HEADER")
                    .help("First line of the output."),
                Param::string("format")
                    .default("{login},{commit.id}")
                    .metavar("OUTPUT_ITEM_FORMAT")
                    .help(
                        "Output line format; {commit.X} takes id, short_id, title, message, author_name, \
                         author_email, authored_date, committed_date, created_at or web_url.",
                    ),
                Param::string("output")
                    .metavar("OUTPUT_FILENAME")
                    .help("Write the list here instead of standard output."),
            ],
            cmd_deadline_commit,
        );
}

fn cmd_get_file(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let remote_template = args.string("remote-file")?;
    let local_template = args.string("local-file")?;
    let branch_template = args.string("branch")?;
    let deadline = args.deadline("deadline")?;
    let filter = CommitFilter::from_blacklist(args.opt_string("blacklist")?)?;

    for_each_project(args, |entry, project| {
        let branch = expand(branch_template, entry)?;
        let Some(commit) = resolve_submission_commit(remote, project, &branch, deadline, &filter, None)? else {
            tracing::error!("No matching commit in {} on {}", project.path_with_namespace, branch);
            return Ok(());
        };
        let remote_path = expand(remote_template, entry)?;
        match remote.get_file(project.id, &commit.id, &remote_path)? {
            Some(content) => {
                let local_path = expand(local_template, entry)?;
                tracing::info!(
                    "File {} in {} has {}B, saving to {}",
                    remote_path,
                    project.path_with_namespace,
                    content.len(),
                    local_path
                );
                std::fs::write(&local_path, content)?;
            }
            None => tracing::error!(
                "File {} does not exist in {} at {}",
                remote_path,
                project.path_with_namespace,
                commit.id
            ),
        }
        Ok(())
    })
}

fn read_local(path: &str) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::LocalFileMissing(path.to_string()),
        _ => Error::Io(e),
    })
}

/// What `put-file` does for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upload {
    Create,
    Update,
    Unchanged,
    /// Content not checked; create, or update if the file is there.
    Forced,
}

fn plan_upload(
    remote: &dyn RemoteService,
    project: &Project,
    branch: &str,
    path: &str,
    content: &str,
    force: bool,
) -> Result<Upload, RemoteError> {
    if force {
        return Ok(Upload::Forced);
    }
    Ok(match remote.get_file(project.id, branch, path)? {
        None => Upload::Create,
        Some(current) if current == content.as_bytes() => Upload::Unchanged,
        Some(_) => Upload::Update,
    })
}

fn commit_upload(remote: &dyn RemoteService, project: &Project, mut commit: FileCommit, upload: Upload) -> Result<(), RemoteError> {
    commit.action = match upload {
        Upload::Update => FileAction::Update,
        _ => FileAction::Create,
    };
    match remote.commit_file(project.id, &commit) {
        Err(RemoteError::BadRequest(_)) if upload == Upload::Forced => {
            commit.action = FileAction::Update;
            remote.commit_file(project.id, &commit)
        }
        other => other,
    }
}

fn cmd_put_file(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let dry_run = args.flag("dry-run")?;
    let force = args.flag("force-commit")?;
    let once = args.flag("once")?;
    let skip_missing = args.flag("skip-missing-files")?;
    if force && once {
        return Err(Error::InvalidOption("--force-commit and --once cannot be combined".to_string()));
    }
    let from_template = args.string("from")?;
    let to_template = args.string("to")?;
    let branch = args.string("branch")?;
    let message_template = args.string("message")?;

    for_each_project(args, |entry, project| {
        let from = expand(from_template, entry)?;
        let to = expand(to_template, entry)?;
        let extras = Extras::new().with("GL", "target_filename", to.as_str());
        let message = expand_with(message_template, entry, &extras)?;

        let content = match read_local(&from) {
            Ok(content) => content,
            Err(Error::LocalFileMissing(path)) if skip_missing => {
                tracing::error!("Skipping {}: local file {} is missing", project.path_with_namespace, path);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let upload = plan_upload(remote, project, branch, &to, &content, force)?;
        match upload {
            Upload::Unchanged => {
                tracing::info!("{} in {} is up to date", to, project.path_with_namespace);
                return Ok(());
            }
            Upload::Update if once => {
                tracing::info!("{} already exists in {}, not overwriting", to, project.path_with_namespace);
                return Ok(());
            }
            _ => {}
        }

        let marker = if dry_run { " (dry run)" } else { "" };
        tracing::info!("Uploading {} to {} as {}{}", from, project.path_with_namespace, to, marker);
        if dry_run {
            return Ok(());
        }
        let commit = FileCommit {
            branch: branch.to_string(),
            file_path: to,
            content,
            message,
            action: FileAction::Create,
        };
        commit_upload(remote, project, commit, upload)?;
        Ok(())
    })
}

/// Commit a clone should be reset to: `--commit` when given, else the
/// submission commit before the deadline.
fn clone_target(
    remote: &dyn RemoteService,
    project: &Project,
    entry: &Entry,
    commit_template: Option<&str>,
    branch: &str,
    deadline: DateTime<Utc>,
    filter: &CommitFilter,
) -> Result<Option<String>, Error> {
    if let Some(template) = commit_template {
        let wanted = expand(template, entry)?;
        return Ok(Some(remote.get_commit(project.id, &wanted)?.id));
    }
    Ok(resolve_submission_commit(remote, project, branch, deadline, filter, None)?.map(|c| c.id))
}

fn cmd_clone(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let to_template = args.string("to")?;
    let branch_template = args.string("branch")?;
    let commit_template = args.opt_string("commit")?;
    let deadline = args.deadline("deadline")?;
    let filter = CommitFilter::from_blacklist(args.opt_string("blacklist")?)?;

    for_each_project(args, |entry, project| {
        let branch = expand(branch_template, entry)?;
        let Some(sha) = clone_target(remote, project, entry, commit_template, &branch, deadline, &filter)? else {
            tracing::error!("No matching commit in {} on {}", project.path_with_namespace, branch);
            return Ok(());
        };
        let url = project.ssh_url_to_repo.as_deref().ok_or_else(|| {
            Error::InvalidOption(format!("{} has no repository URL", project.path_with_namespace))
        })?;
        let target = expand(to_template, entry)?;
        tracing::info!("Cloning {} into {} at {}", project.path_with_namespace, target, sha);
        local::clone_or_fetch(url, Path::new(&target))?;
        local::reset_to_commit(Path::new(&target), &sha)
    })
}

/// `{commit.*}` values for one output line. Unresolved rows get zero ids
/// and empty fields so every row still prints.
fn commit_extras(commit: Option<&Commit>) -> Extras {
    let date = |d: Option<DateTime<Utc>>| d.map(|d| d.to_rfc3339()).unwrap_or_default();
    let fields: [(&str, String); 10] = match commit {
        Some(c) => [
            ("id", c.id.clone()),
            ("short_id", c.short_id.clone()),
            ("title", c.title.clone()),
            ("message", c.message.clone()),
            ("author_name", c.author_name.clone()),
            ("author_email", c.author_email.clone()),
            ("authored_date", date(c.authored_date)),
            ("committed_date", date(c.committed_date)),
            ("created_at", c.created_at.to_rfc3339()),
            ("web_url", c.web_url.clone()),
        ],
        None => [
            ("id", UNRESOLVED_COMMIT.to_string()),
            ("short_id", UNRESOLVED_COMMIT[..8].to_string()),
            ("title", String::new()),
            ("message", String::new()),
            ("author_name", String::new()),
            ("author_email", String::new()),
            ("authored_date", String::new()),
            ("committed_date", String::new()),
            ("created_at", String::new()),
            ("web_url", String::new()),
        ],
    };
    fields
        .into_iter()
        .fold(Extras::new(), |extras, (key, value)| extras.with("commit", key, value))
}

fn cmd_deadline_commit(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let branch_template = args.string("branch")?;
    let tag_template = args.opt_string("prefer-tag")?;
    let deadline = args.deadline("deadline")?;
    let filter = CommitFilter::from_blacklist(args.opt_string("blacklist")?)?;
    let format = args.string("format")?;

    let mut out: Box<dyn Write> = match args.opt_string("output")? {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    writeln!(out, "{}", args.string("first-line")?)?;

    for_each_project(args, |entry, project| {
        let branch = expand(branch_template, entry)?;
        let prefer_tag = tag_template.map(|t| expand(t, entry)).transpose()?;
        let commit = match resolve_submission_commit(remote, project, &branch, deadline, &filter, prefer_tag.as_deref()) {
            Ok(Some(commit)) => Some(commit),
            Ok(None) => {
                tracing::warn!("No matching commit in {} on {}", project.path_with_namespace, branch);
                None
            }
            Err(e) => {
                tracing::error!("{}: {}", project.path_with_namespace, e);
                None
            }
        };
        let line = expand_with(format, entry, &commit_extras(commit.as_ref()))?;
        tracing::debug!("{} -> {}", project.path_with_namespace, line);
        writeln!(out, "{}", line)?;
        Ok(())
    })?;
    out.flush()?;
    Ok(())
}
