//! GB-014: Command registry.
//!
//! Commands are registered once with a name, a one-line description, an
//! ordered list of parameter descriptors and a handler. The registry builds
//! the clap surface from the descriptors, validates an invocation before any
//! remote work, resolves the descriptors in declaration order and calls the
//! handler with the typed [`Args`].

use super::error::Error;
use super::params::{Param, Value};
use super::resolver::AccountList;
use super::types::{AccessLevel, Entries};
use crate::transport::RemoteService;
use chrono::{DateTime, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indexmap::IndexMap;

/// Command body.
pub type Handler = fn(&Args<'_>) -> Result<(), Error>;

/// Immutable record of one registered command.
pub struct CommandSpec {
    pub name: &'static str,
    pub about: &'static str,
    pub params: Vec<Param>,
    pub handler: Handler,
}

/// Collaborators shared by every invocation.
pub struct Context<'c> {
    pub remote: &'c dyn RemoteService,
}

/// Resolved parameters of one invocation, looked up by parameter key.
pub struct Args<'c> {
    command: &'static str,
    values: IndexMap<&'static str, Value<'c>>,
}

impl<'c> Args<'c> {
    pub fn command(&self) -> &'static str {
        self.command
    }

    fn get(&self, key: &str) -> Result<&Value<'c>, Error> {
        self.values
            .get(key)
            .ok_or_else(|| Error::MissingParameter(key.to_string()))
    }

    fn mismatch(&self, key: &str, expected: &str) -> Error {
        Error::InvalidOption(format!("parameter '{}' of {} is not {}", key, self.command, expected))
    }

    pub fn remote(&self) -> Result<&'c dyn RemoteService, Error> {
        match self.get("remote")? {
            Value::Remote(remote) => Ok(*remote),
            _ => Err(self.mismatch("remote", "a remote handle")),
        }
    }

    pub fn logger(&self) -> Result<&tracing::Span, Error> {
        match self.get("logger")? {
            Value::Logger(span) => Ok(span),
            _ => Err(self.mismatch("logger", "a logger")),
        }
    }

    pub fn entries(&self) -> Result<&Entries, Error> {
        match self.get(super::params::ENTRIES_KEY)? {
            Value::Entries(entries) => Ok(entries),
            _ => Err(self.mismatch("entries", "an entry list")),
        }
    }

    pub fn accounts(&self) -> Result<&AccountList, Error> {
        match self.get(super::params::USERS_KEY)? {
            Value::Accounts(accounts) => Ok(accounts),
            _ => Err(self.mismatch("users", "an account list")),
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool, Error> {
        match self.get(name)? {
            Value::Flag(set) => Ok(*set),
            _ => Err(self.mismatch(name, "a flag")),
        }
    }

    pub fn opt_string(&self, name: &str) -> Result<Option<&str>, Error> {
        match self.get(name)? {
            Value::Str(value) => Ok(value.as_deref()),
            _ => Err(self.mismatch(name, "a string option")),
        }
    }

    /// String option that must have a value (given or defaulted).
    pub fn string(&self, name: &str) -> Result<&str, Error> {
        self.opt_string(name)?
            .ok_or_else(|| Error::MissingParameter(name.to_string()))
    }

    pub fn access_level(&self, name: &str) -> Result<AccessLevel, Error> {
        match self.get(name)? {
            Value::Access(Some(level)) => Ok(*level),
            Value::Access(None) => Err(Error::MissingParameter(name.to_string())),
            _ => Err(self.mismatch(name, "an access level")),
        }
    }

    pub fn deadline(&self, name: &str) -> Result<DateTime<Utc>, Error> {
        match self.get(name)? {
            Value::Deadline(ts) => Ok(*ts),
            _ => Err(self.mismatch(name, "a deadline")),
        }
    }
}

/// All known commands, in registration order.
#[derive(Default)]
pub struct Registry {
    commands: Vec<CommandSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. A later registration under an existing name is ignored.
    pub fn register(&mut self, name: &'static str, about: &'static str, params: Vec<Param>, handler: Handler) -> &mut Self {
        if self.find(name).is_some() {
            tracing::debug!("command {} already registered", name);
            return self;
        }
        self.commands.push(CommandSpec {
            name,
            about,
            params,
            handler,
        });
        self
    }

    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    pub fn find(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// The full command-line surface: global options plus one subcommand per command.
    pub fn build_surface(&self) -> Command {
        let root = Command::new("gitlab-batch")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Batch operations on GitLab projects and accounts driven by CSV rosters")
            .subcommand_required(false)
            .arg(
                Arg::new("debug")
                    .long("debug")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Print debugging messages."),
            )
            .arg(
                Arg::new("instance")
                    .long("instance")
                    .global(true)
                    .value_name("NAME")
                    .help("Which GitLab instance to choose."),
            )
            .arg(
                Arg::new("config-file")
                    .long("config-file")
                    .global(true)
                    .value_name("FILE")
                    .action(ArgAction::Append)
                    .help("Instance configuration file (may be repeated)."),
            );

        self.commands.iter().fold(root, |root, spec| {
            let sub = spec
                .params
                .iter()
                .fold(Command::new(spec.name).about(spec.about), |cmd, param| param.contribute(cmd));
            root.subcommand(sub)
        })
    }

    /// Check requiredness and syntax of every descriptor of `name`.
    pub fn validate(&self, name: &str, matches: &ArgMatches) -> Result<&CommandSpec, Error> {
        let spec = self
            .find(name)
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))?;
        for param in &spec.params {
            param.check(matches)?;
        }
        Ok(spec)
    }

    /// Validate, resolve every descriptor in order, run the handler.
    pub fn invoke(&self, name: &str, matches: &ArgMatches, ctx: &Context<'_>) -> Result<(), Error> {
        let spec = self.validate(name, matches)?;
        let span = tracing::info_span!("command", name = spec.name);
        let _entered = span.enter();

        let mut values = IndexMap::with_capacity(spec.params.len());
        for param in &spec.params {
            values.insert(param.key(), param.resolve(matches, ctx, &span)?);
        }
        (spec.handler)(&Args {
            command: spec.name,
            values,
        })
    }
}
