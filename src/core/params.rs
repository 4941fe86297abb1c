//! GB-013: Parameter descriptors.
//!
//! A command declares an ordered list of [`Param`]s. Each descriptor knows
//! which command-line arguments it contributes, how to validate them, and
//! how to turn the parsed matches into a typed [`Value`] for the handler.

use super::error::Error;
use super::parser::{load_entries, parse_deadline};
use super::registry::Context;
use super::resolver::AccountList;
use super::types::{AccessLevel, Entries};
use crate::transport::RemoteService;
use chrono::{DateTime, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::Path;

/// Long option name plus its presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub metavar: Option<&'static str>,
    pub help: Option<&'static str>,
    pub required: bool,
}

impl OptionSpec {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            metavar: None,
            help: None,
            required: false,
        }
    }

    fn value_arg(&self) -> Arg {
        let mut arg = Arg::new(self.name).long(self.name).action(ArgAction::Set);
        if let Some(metavar) = self.metavar {
            arg = arg.value_name(metavar);
        }
        if let Some(help) = self.help {
            arg = arg.help(help);
        }
        arg
    }
}

/// Deprecated switch standing for a fixed access level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatFlag {
    pub name: &'static str,
    pub help: &'static str,
    pub level: AccessLevel,
}

/// One declared parameter of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// The shared remote service handle.
    Remote,
    /// A span named after the command.
    Logger,
    /// `--entries FILE` (alias `--users`): the CSV roster.
    Entries,
    /// `--users FILE` + `--login-column`: the roster resolved to accounts.
    Accounts { allow_placeholder: bool },
    /// `--name` switch.
    Flag(OptionSpec),
    /// `--name VALUE`.
    Str {
        spec: OptionSpec,
        default: Option<&'static str>,
    },
    /// `--name LEVEL` plus deprecated fixed-level switches.
    Access {
        spec: OptionSpec,
        default: Option<AccessLevel>,
        compat: Vec<CompatFlag>,
    },
    /// `--name TIMESTAMP`.
    Deadline {
        spec: OptionSpec,
        default: &'static str,
    },
}

/// A resolved parameter.
pub enum Value<'c> {
    Remote(&'c dyn RemoteService),
    Logger(tracing::Span),
    Entries(Entries),
    Accounts(AccountList),
    Flag(bool),
    Str(Option<String>),
    Access(Option<AccessLevel>),
    Deadline(DateTime<Utc>),
}

pub const ENTRIES_KEY: &str = "entries";
pub const USERS_KEY: &str = "users";
pub const LOGIN_COLUMN_KEY: &str = "login-column";

impl Param {
    pub fn remote() -> Self {
        Self::Remote
    }

    pub fn logger() -> Self {
        Self::Logger
    }

    pub fn entries() -> Self {
        Self::Entries
    }

    /// Accounts; with `allow_placeholder` unknown logins are kept as `NotFound`.
    pub fn accounts(allow_placeholder: bool) -> Self {
        Self::Accounts { allow_placeholder }
    }

    pub fn flag(name: &'static str, help: &'static str) -> Self {
        Self::Flag(OptionSpec {
            help: Some(help),
            ..OptionSpec::new(name)
        })
    }

    /// Boolean `--dry-run`.
    pub fn dry_run() -> Self {
        Self::flag("dry-run", "Simulate but do not make any real changes.")
    }

    pub fn string(name: &'static str) -> Self {
        Self::Str {
            spec: OptionSpec::new(name),
            default: None,
        }
    }

    pub fn access(name: &'static str) -> Self {
        Self::Access {
            spec: OptionSpec::new(name),
            default: None,
            compat: Vec::new(),
        }
    }

    pub fn deadline(name: &'static str) -> Self {
        Self::Deadline {
            spec: OptionSpec {
                metavar: Some("YYYY-MM-DDTHH:MM:SSZ"),
                help: Some("Submission deadline (defaults to now)."),
                ..OptionSpec::new(name)
            },
            default: "now",
        }
    }

    fn spec_mut(&mut self) -> Option<&mut OptionSpec> {
        match self {
            Self::Flag(spec)
            | Self::Str { spec, .. }
            | Self::Access { spec, .. }
            | Self::Deadline { spec, .. } => Some(spec),
            _ => None,
        }
    }

    pub fn required(mut self) -> Self {
        if let Some(spec) = self.spec_mut() {
            spec.required = true;
        }
        self
    }

    pub fn metavar(mut self, metavar: &'static str) -> Self {
        if let Some(spec) = self.spec_mut() {
            spec.metavar = Some(metavar);
        }
        self
    }

    pub fn help(mut self, help: &'static str) -> Self {
        if let Some(spec) = self.spec_mut() {
            spec.help = Some(help);
        }
        self
    }

    /// Default for a string option.
    pub fn default(mut self, value: &'static str) -> Self {
        match &mut self {
            Self::Str { default, .. } => *default = Some(value),
            Self::Deadline { default, .. } => *default = value,
            _ => {}
        }
        self
    }

    /// Default for an access-level option.
    pub fn default_level(mut self, level: AccessLevel) -> Self {
        if let Self::Access { default, .. } = &mut self {
            *default = Some(level);
        }
        self
    }

    /// Add a deprecated switch forcing `level`.
    pub fn compat(mut self, name: &'static str, help: &'static str, level: AccessLevel) -> Self {
        if let Self::Access { compat, .. } = &mut self {
            compat.push(CompatFlag { name, help, level });
        }
        self
    }

    /// Key under which the resolved value is stored.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Logger => "logger",
            Self::Entries => ENTRIES_KEY,
            Self::Accounts { .. } => USERS_KEY,
            Self::Flag(spec)
            | Self::Str { spec, .. }
            | Self::Access { spec, .. }
            | Self::Deadline { spec, .. } => spec.name,
        }
    }

    /// Add this descriptor's arguments to `cmd`.
    pub fn contribute(&self, cmd: Command) -> Command {
        match self {
            Self::Remote | Self::Logger => cmd,
            Self::Entries => cmd.arg(
                Arg::new(ENTRIES_KEY)
                    .long(ENTRIES_KEY)
                    .visible_alias(USERS_KEY)
                    .value_name("LIST.csv")
                    .help("CSV file with entries (one row per item)."),
            ),
            Self::Accounts { .. } => cmd
                .arg(
                    Arg::new(USERS_KEY)
                        .long(USERS_KEY)
                        .visible_alias(ENTRIES_KEY)
                        .value_name("LIST.csv")
                        .help("CSV file with users."),
                )
                .arg(
                    Arg::new(LOGIN_COLUMN_KEY)
                        .long(LOGIN_COLUMN_KEY)
                        .value_name("COLUMN")
                        .default_value("login")
                        .help("Column name with the login."),
                ),
            Self::Flag(spec) => {
                let mut arg = Arg::new(spec.name).long(spec.name).action(ArgAction::SetTrue);
                if let Some(help) = spec.help {
                    arg = arg.help(help);
                }
                cmd.arg(arg)
            }
            Self::Str { spec, .. } | Self::Deadline { spec, .. } => cmd.arg(spec.value_arg()),
            Self::Access { spec, compat, .. } => {
                let mut primary = spec.value_arg();
                if spec.metavar.is_none() {
                    primary = primary.value_name("LEVEL");
                }
                let mut cmd = cmd.arg(primary);
                for flag in compat {
                    let others: Vec<&'static str> = compat
                        .iter()
                        .filter(|f| f.name != flag.name)
                        .map(|f| f.name)
                        .chain(std::iter::once(spec.name))
                        .collect();
                    cmd = cmd.arg(
                        Arg::new(flag.name)
                            .long(flag.name)
                            .action(ArgAction::SetTrue)
                            .help(flag.help)
                            .conflicts_with_all(others),
                    );
                }
                cmd
            }
        }
    }

    /// Requiredness and syntax checks; no I/O.
    pub fn check(&self, matches: &ArgMatches) -> Result<(), Error> {
        match self {
            Self::Remote | Self::Logger | Self::Flag(_) => Ok(()),
            Self::Entries | Self::Accounts { .. } => {
                if string_arg(matches, self.key()).is_none() {
                    return Err(Error::MissingParameter(self.key().to_string()));
                }
                Ok(())
            }
            Self::Str { spec, default } => {
                if spec.required && default.is_none() && string_arg(matches, spec.name).is_none() {
                    return Err(Error::MissingParameter(spec.name.to_string()));
                }
                Ok(())
            }
            Self::Access { .. } => self.access_level(matches).map(|_| ()),
            Self::Deadline { spec, .. } => {
                if let Some(value) = string_arg(matches, spec.name) {
                    parse_deadline(&value)?;
                }
                Ok(())
            }
        }
    }

    fn access_level(&self, matches: &ArgMatches) -> Result<Option<AccessLevel>, Error> {
        let Self::Access { spec, default, compat } = self else {
            return Ok(None);
        };
        if let Some(flag) = compat.iter().find(|f| matches.get_flag(f.name)) {
            return Ok(Some(flag.level));
        }
        match string_arg(matches, spec.name) {
            Some(value) => value.parse::<AccessLevel>().map(Some),
            None if spec.required && default.is_none() => Err(Error::MissingParameter(spec.name.to_string())),
            None => Ok(*default),
        }
    }

    /// Turn parsed matches into a value. Loads CSV files.
    pub fn resolve<'c>(&self, matches: &ArgMatches, ctx: &Context<'c>, span: &tracing::Span) -> Result<Value<'c>, Error> {
        Ok(match self {
            Self::Remote => Value::Remote(ctx.remote),
            Self::Logger => Value::Logger(span.clone()),
            Self::Entries => Value::Entries(load_entries(Path::new(&required_arg(matches, ENTRIES_KEY)?))?),
            Self::Accounts { allow_placeholder } => Value::Accounts(AccountList {
                entries: load_entries(Path::new(&required_arg(matches, USERS_KEY)?))?,
                login_column: string_arg(matches, LOGIN_COLUMN_KEY).unwrap_or_else(|| "login".to_string()),
                allow_placeholder: *allow_placeholder,
            }),
            Self::Flag(spec) => Value::Flag(matches.get_flag(spec.name)),
            Self::Str { spec, default } => {
                Value::Str(string_arg(matches, spec.name).or_else(|| default.map(str::to_string)))
            }
            Self::Access { spec, compat, .. } => {
                if let Some(flag) = compat.iter().find(|f| matches.get_flag(f.name)) {
                    tracing::warn!("--{} is deprecated, use --{} {}", flag.name, spec.name, flag.level);
                }
                Value::Access(self.access_level(matches)?)
            }
            Self::Deadline { spec, default } => {
                let raw = string_arg(matches, spec.name).unwrap_or_else(|| default.to_string());
                Value::Deadline(parse_deadline(&raw)?)
            }
        })
    }
}

fn string_arg(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

fn required_arg(matches: &ArgMatches, id: &str) -> Result<String, Error> {
    string_arg(matches, id).ok_or_else(|| Error::MissingParameter(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(params: &[Param]) -> Command {
        params
            .iter()
            .fold(Command::new("test").no_binary_name(true), |cmd, p| p.contribute(cmd))
    }

    fn merge_level() -> Param {
        Param::access("merge-access-level")
            .default_level(AccessLevel::Maintainer)
            .compat("developers-can-merge", "DEPRECATED", AccessLevel::Developer)
    }

    #[test]
    fn test_gb013_access_level_default_and_explicit() {
        let param = merge_level();
        let cmd = surface(std::slice::from_ref(&param));
        let m = cmd.clone().try_get_matches_from(Vec::<&str>::new()).unwrap();
        assert_eq!(param.access_level(&m).unwrap(), Some(AccessLevel::Maintainer));
        let m = cmd.try_get_matches_from(["--merge-access-level", "developer"]).unwrap();
        assert_eq!(param.access_level(&m).unwrap(), Some(AccessLevel::Developer));
    }

    #[test]
    fn test_gb013_compat_flag_forces_level() {
        let param = merge_level();
        let m = surface(std::slice::from_ref(&param))
            .try_get_matches_from(["--developers-can-merge"])
            .unwrap();
        assert_eq!(param.access_level(&m).unwrap(), Some(AccessLevel::Developer));
    }

    #[test]
    fn test_gb013_compat_flag_conflicts_with_primary() {
        let result = surface(&[merge_level()])
            .try_get_matches_from(["--developers-can-merge", "--merge-access-level", "guest"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_gb013_compat_flags_conflict_with_each_other() {
        let param = Param::access("create-access-level")
            .default_level(AccessLevel::NoAccess)
            .compat("developers-can-create", "DEPRECATED", AccessLevel::Developer)
            .compat("maintainers-can-create", "DEPRECATED", AccessLevel::Maintainer);
        let result = surface(&[param]).try_get_matches_from(["--developers-can-create", "--maintainers-can-create"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_gb013_invalid_access_level() {
        let param = merge_level();
        let m = surface(std::slice::from_ref(&param))
            .try_get_matches_from(["--merge-access-level", "wizard"])
            .unwrap();
        assert!(matches!(param.check(&m), Err(Error::InvalidAccessLevel(_))));
    }

    #[test]
    fn test_gb013_required_access_level_missing() {
        let param = Param::access("access-level").required();
        let m = surface(std::slice::from_ref(&param))
            .try_get_matches_from(Vec::<&str>::new())
            .unwrap();
        assert!(matches!(param.check(&m), Err(Error::MissingParameter(ref n)) if n == "access-level"));
    }

    #[test]
    fn test_gb013_required_string_missing() {
        let param = Param::string("project").required();
        let m = surface(std::slice::from_ref(&param))
            .try_get_matches_from(Vec::<&str>::new())
            .unwrap();
        assert!(matches!(param.check(&m), Err(Error::MissingParameter(ref n)) if n == "project"));
    }

    #[test]
    fn test_gb013_entries_required_and_aliased() {
        let param = Param::entries();
        let cmd = surface(std::slice::from_ref(&param));
        let m = cmd.clone().try_get_matches_from(Vec::<&str>::new()).unwrap();
        assert!(matches!(param.check(&m), Err(Error::MissingParameter(_))));
        let m = cmd.try_get_matches_from(["--users", "list.csv"]).unwrap();
        assert!(param.check(&m).is_ok());
    }

    #[test]
    fn test_gb013_deadline_checked_early() {
        let param = Param::deadline("deadline");
        let m = surface(std::slice::from_ref(&param))
            .try_get_matches_from(["--deadline", "soon"])
            .unwrap();
        assert!(matches!(param.check(&m), Err(Error::InvalidDeadline(_))));
    }

    #[test]
    fn test_gb013_unknown_option_rejected() {
        assert!(surface(&[Param::string("project")])
            .try_get_matches_from(["--projetc", "x"])
            .is_err());
    }

    #[test]
    fn test_gb013_builder_sets_spec() {
        let param = Param::string("branch").default("master").metavar("BRANCH").help("Branch.");
        match param {
            Param::Str { spec, default } => {
                assert_eq!(default, Some("master"));
                assert_eq!(spec.metavar, Some("BRANCH"));
                assert_eq!(spec.help, Some("Branch."));
                assert!(!spec.required);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_gb013_keys() {
        assert_eq!(Param::entries().key(), "entries");
        assert_eq!(Param::accounts(false).key(), "users");
        assert_eq!(Param::dry_run().key(), "dry-run");
    }
}
