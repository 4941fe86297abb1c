//! GB-016: Account commands — lookup, forking and project membership.

use super::{project_param, row_result};
use crate::core::error::{Error, RemoteError};
use crate::core::params::Param;
use crate::core::reconcile::reconcile;
use crate::core::registry::{Args, Registry};
use crate::core::resolver::{resolve_accounts, AccountList, AccountMatch};
use crate::core::template::expand;
use crate::core::types::{AccessLevel, Member, Project};
use crate::resources::member::MembershipResource;
use crate::transport::RemoteService;
use std::fmt;
use std::time::Duration;

const FORK_WAIT_ATTEMPTS: u32 = 120;
const FORK_WAIT_INTERVAL: Duration = Duration::from_secs(5);

pub(super) fn register(registry: &mut Registry) {
    registry
        .register(
            "accounts",
            "List accounts that were not found.",
            vec![
                Param::remote(),
                Param::accounts(true),
                Param::flag("show-summary", "Show summary numbers."),
            ],
            cmd_accounts,
        )
        .register(
            "fork",
            "Fork one repository multiple times.",
            vec![
                Param::remote(),
                Param::logger(),
                Param::accounts(true),
                Param::string("from")
                    .required()
                    .metavar("REPO_PATH")
                    .help("Parent repository path."),
                Param::string("to")
                    .required()
                    .metavar("REPO_PATH_WITH_FORMAT")
                    .help("Target repository path, formatted from CSV columns."),
                Param::flag("hide-fork", "Hide fork relationship."),
                Param::flag("include-invalid-users", "Fork even for users not found."),
            ],
            cmd_fork,
        )
        .register(
            "get-members",
            "Get members of a project.",
            vec![
                Param::remote(),
                Param::string("project").required().metavar("PROJECT_PATH").help("Project path."),
                Param::flag("inherited", "Show inherited members too."),
            ],
            cmd_get_members,
        )
        .register(
            "add-member",
            "Add members to multiple projects.",
            vec![
                Param::remote(),
                Param::accounts(false),
                project_param(),
                Param::access("access-level")
                    .required()
                    .help("Access level, e.g. DEVELOPER or REPORTER."),
                Param::dry_run(),
            ],
            cmd_add_member,
        )
        .register(
            "remove-member",
            "Remove members from multiple projects.",
            vec![Param::remote(), Param::accounts(false), project_param(), Param::dry_run()],
            cmd_remove_member,
        );
}

/// Found/not-found tally of a roster.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AccountSummary {
    total: usize,
    found: usize,
}

impl AccountSummary {
    fn record(&mut self, account: Option<&AccountMatch>) {
        self.total += 1;
        if account.is_some_and(AccountMatch::is_found) {
            self.found += 1;
        }
    }
}

impl fmt::Display for AccountSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {}, Not-found: {}, Ok: {}",
            self.total,
            self.total - self.found,
            self.found
        )
    }
}

fn summarize_accounts(remote: &dyn RemoteService, list: &AccountList) -> Result<AccountSummary, Error> {
    let mut summary = AccountSummary::default();
    for resolved in resolve_accounts(remote, &list.entries, &list.login_column, true) {
        summary.record(resolved?.account.as_ref());
    }
    Ok(summary)
}

fn cmd_accounts(args: &Args<'_>) -> Result<(), Error> {
    let summary = summarize_accounts(args.remote()?, args.accounts()?)?;
    if args.flag("show-summary")? {
        println!("{}", summary);
    }
    Ok(())
}

fn cmd_fork(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let log = args.logger()?;
    let parent = remote.get_project(args.string("from")?)?;
    let to_template = args.string("to")?;
    let hide_fork = args.flag("hide-fork")?;
    let include_invalid = args.flag("include-invalid-users")?;

    for resolved in args.accounts()?.iter(remote) {
        let resolved = resolved?;
        let Some(account) = resolved.account.as_ref() else {
            continue;
        };
        if !account.is_found() && !include_invalid {
            continue;
        }

        let result = expand(to_template, resolved.entry).and_then(|to_path| {
            tracing::info!(
                parent: log,
                "Forking {} to {} for user {}",
                parent.path_with_namespace,
                to_path,
                account.login()
            );
            let fork = fork_or_reuse(remote, &parent, &to_path)?;
            let fork = wait_until_imported(remote, fork, FORK_WAIT_ATTEMPTS, FORK_WAIT_INTERVAL)?;
            if hide_fork {
                unlink_fork(remote, &fork)?;
            }
            Ok(())
        });
        row_result(account.login(), result)?;
    }
    Ok(())
}

/// Fork `parent` to `to_path`; an existing target is reused.
fn fork_or_reuse(remote: &dyn RemoteService, parent: &Project, to_path: &str) -> Result<Project, Error> {
    let (namespace, name) = to_path
        .rsplit_once('/')
        .ok_or_else(|| Error::InvalidOption(format!("fork target '{}' has no namespace", to_path)))?;
    match remote.fork_project(parent.id, namespace, name) {
        Ok(fork) => Ok(fork),
        Err(RemoteError::Conflict(_)) => {
            tracing::debug!("{} already exists, not forking again", to_path);
            Ok(remote.get_project(to_path)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Poll until the fork has content, at most `attempts` times.
fn wait_until_imported(
    remote: &dyn RemoteService,
    mut project: Project,
    attempts: u32,
    interval: Duration,
) -> Result<Project, Error> {
    for _ in 0..attempts {
        if !project.empty_repo {
            return Ok(project);
        }
        tracing::debug!("Waiting for {} to be imported", project.path_with_namespace);
        std::thread::sleep(interval);
        project = remote.get_project(&project.path_with_namespace)?;
    }
    if project.empty_repo {
        tracing::warn!("{} is still empty, giving up waiting", project.path_with_namespace);
    }
    Ok(project)
}

fn unlink_fork(remote: &dyn RemoteService, fork: &Project) -> Result<(), Error> {
    match remote.delete_fork_relation(fork.id) {
        Ok(()) | Err(RemoteError::NotModified(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn members_csv(members: &[Member]) -> Result<String, Error> {
    let csv_error = |source| Error::Csv {
        path: "<stdout>".to_string(),
        source,
    };
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["login", "name"]).map_err(csv_error)?;
    for member in members {
        writer
            .write_record([member.username.as_str(), member.name.as_str()])
            .map_err(csv_error)?;
    }
    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn cmd_get_members(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let project = remote.get_project(args.string("project")?)?;
    let members = remote.list_members(project.id, args.flag("inherited")?)?;
    print!("{}", members_csv(&members)?);
    Ok(())
}

/// Converge membership of every found account in its project.
fn converge_membership(args: &Args<'_>, level: Option<AccessLevel>) -> Result<(), Error> {
    let remote = args.remote()?;
    let dry_run = args.flag("dry-run")?;

    for resolved in args.accounts()?.projects(remote, args.string("project")?) {
        let resolved = resolved?;
        let Some(AccountMatch::Found(account)) = resolved.row.account.as_ref() else {
            continue;
        };
        let result = reconcile(
            remote,
            &resolved.project,
            &MembershipResource::new(account),
            level.as_ref(),
            dry_run,
        );
        row_result(&resolved.path, result.map(|_| ()).map_err(Error::from))?;
    }
    Ok(())
}

fn cmd_add_member(args: &Args<'_>) -> Result<(), Error> {
    converge_membership(args, Some(args.access_level("access-level")?))
}

fn cmd_remove_member(args: &Args<'_>) -> Result<(), Error> {
    converge_membership(args, None)
}
