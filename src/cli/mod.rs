//! GB-015: CLI — command registration, dispatch and logging setup.

mod files;
mod members;
mod pipelines;
mod protection;

use crate::core::config::{default_config_paths, load_config, select_instance};
use crate::core::error::Error;
use crate::core::params::Param;
use crate::core::registry::{Args, Context, Registry};
use crate::core::resolver::resolve_projects;
use crate::core::types::{Entry, Project};
use crate::transport::gitlab::GitLabClient;
use clap::ArgMatches;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Every command of the tool.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    members::register(&mut registry);
    protection::register(&mut registry);
    files::register(&mut registry);
    pipelines::register(&mut registry);
    registry
}

/// Run the subcommand selected in `matches` against the configured instance.
///
/// Without a subcommand the help is printed. Parameters are validated
/// before the configuration is read or any request is made.
pub fn dispatch(registry: &Registry, matches: &ArgMatches) -> Result<(), Error> {
    let Some((name, sub)) = matches.subcommand() else {
        registry.build_surface().print_help()?;
        println!();
        return Ok(());
    };
    registry.validate(name, sub)?;

    init_logging(matches.get_flag("debug"));
    let client = connect(matches)?;
    registry.invoke(name, sub, &Context { remote: &client })
}

/// Log to stderr at `info` (or `debug`); `RUST_LOG` overrides.
pub fn init_logging(debug: bool) {
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // A subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn connect(matches: &ArgMatches) -> Result<GitLabClient, Error> {
    let explicit: Vec<PathBuf> = matches
        .get_many::<String>("config-file")
        .map(|files| files.map(PathBuf::from).collect())
        .unwrap_or_default();
    let paths = if explicit.is_empty() {
        default_config_paths().into_iter().filter(|p| p.exists()).collect()
    } else {
        explicit
    };

    let config = load_config(&paths)?;
    let requested = matches.get_one::<String>("instance").map(String::as_str);
    let instance = select_instance(&config, requested, |key| std::env::var(key).ok())?;
    tracing::debug!("Using GitLab at {}", instance.url);
    Ok(GitLabClient::new(&instance)?)
}

/// `--project` as used by every per-project command.
fn project_param() -> Param {
    Param::string("project")
        .required()
        .metavar("PROJECT_PATH_WITH_FORMAT")
        .help("Project path, formatted from CSV columns.")
}

fn branch_param(help: &'static str) -> Param {
    Param::string("branch").default("master").metavar("BRANCH_WITH_FORMAT").help(help)
}

fn blacklist_param() -> Param {
    Param::string("blacklist")
        .metavar("BLACKLIST")
        .help("Commit authors to ignore (regular expression).")
}

/// Log a failure that only concerns one row and carry on; abort on anything else.
fn row_result(label: &str, result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(e) if matches!(e, Error::Remote(_)) || e.is_row_scoped() => {
            tracing::error!("{}: {}", label, e);
            Ok(())
        }
        other => other,
    }
}

/// Apply `apply` to every distinct project named by `--project` over the entries.
fn for_each_project<F>(args: &Args<'_>, mut apply: F) -> Result<(), Error>
where
    F: FnMut(&Entry, &Project) -> Result<(), Error>,
{
    let remote = args.remote()?;
    for resolved in resolve_projects(remote, args.entries()?, args.string("project")?, false) {
        let resolved = resolved?;
        row_result(&resolved.path, apply(resolved.row, &resolved.project))?;
    }
    Ok(())
}
