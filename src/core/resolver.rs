//! GB-006: Entry resolution — rows to accounts and projects.
//!
//! Both resolvers are lazy iterators: nothing is looked up until the caller
//! pulls the next item, so output for the first row appears before the
//! whole roster has been resolved. Rows that cannot be resolved are logged
//! once and skipped; unexpected remote failures are yielded as `Err`.

use super::error::Error;
use super::template::expand;
use super::types::{Account, Entries, Entry, Project};
use crate::transport::RemoteService;
use std::collections::HashMap;

/// Outcome of looking up one login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountMatch {
    Found(Account),
    /// Placeholder for a login the service does not know.
    NotFound(String),
}

impl AccountMatch {
    pub fn login(&self) -> &str {
        match self {
            Self::Found(account) => &account.username,
            Self::NotFound(login) => login,
        }
    }

    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Found(account) => Some(account),
            Self::NotFound(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// An entry paired with its account lookup.
///
/// `account` is `None` when the login was not found and placeholders are
/// disabled, or when the row has no login column.
#[derive(Debug, Clone)]
pub struct ResolvedAccount<'a> {
    pub entry: &'a Entry,
    pub account: Option<AccountMatch>,
}

impl AsRef<Entry> for ResolvedAccount<'_> {
    fn as_ref(&self) -> &Entry {
        self.entry
    }
}

/// Lazy account lookup over entries.
pub struct AccountResolver<'a, 'r> {
    remote: &'r dyn RemoteService,
    rows: std::slice::Iter<'a, Entry>,
    login_column: String,
    allow_placeholder: bool,
    keep_absent: bool,
}

impl<'a> Iterator for AccountResolver<'a, '_> {
    type Item = Result<ResolvedAccount<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.rows.next()?;
            let account = match self.lookup(entry) {
                Ok(account) => account,
                Err(e) => return Some(Err(e)),
            };
            if account.is_none() && !self.keep_absent {
                continue;
            }
            return Some(Ok(ResolvedAccount { entry, account }));
        }
    }
}

impl AccountResolver<'_, '_> {
    fn lookup(&self, entry: &Entry) -> Result<Option<AccountMatch>, Error> {
        let Some(login) = entry.get(&self.login_column) else {
            tracing::warn!(
                "Row {} has no column '{}', skipping",
                entry.label(&self.login_column),
                self.login_column
            );
            return Ok(None);
        };

        let found = self.remote.find_users(login)?.into_iter().next();
        match found {
            Some(account) => Ok(Some(AccountMatch::Found(account))),
            None => {
                tracing::warn!("User {} not found", login);
                if self.allow_placeholder {
                    Ok(Some(AccountMatch::NotFound(login.to_string())))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// Pair every entry with its account lookup, one item per row.
pub fn resolve_accounts<'a, 'r>(
    remote: &'r dyn RemoteService,
    entries: &'a Entries,
    login_column: &str,
    allow_placeholder: bool,
) -> AccountResolver<'a, 'r> {
    AccountResolver {
        remote,
        rows: entries.iter(),
        login_column: login_column.to_string(),
        allow_placeholder,
        keep_absent: true,
    }
}

/// Loaded roster plus the rule for turning it into accounts.
#[derive(Debug, Clone)]
pub struct AccountList {
    pub entries: Entries,
    pub login_column: String,
    pub allow_placeholder: bool,
}

impl AccountList {
    /// Accounts of the roster; rows without a usable account are dropped.
    pub fn iter<'a, 'r>(&'a self, remote: &'r dyn RemoteService) -> AccountResolver<'a, 'r> {
        AccountResolver {
            keep_absent: false,
            ..resolve_accounts(remote, &self.entries, &self.login_column, self.allow_placeholder)
        }
    }

    /// Accounts and their projects (`template` expanded per row).
    pub fn projects<'a, 'r>(
        &'a self,
        remote: &'r dyn RemoteService,
        template: &str,
    ) -> ProjectResolver<'r, AccountResolver<'a, 'r>> {
        ProjectResolver::new(remote, self.iter(remote), template, true)
    }
}

/// A row paired with the project its template names.
#[derive(Debug, Clone)]
pub struct ResolvedProject<T> {
    pub row: T,
    pub path: String,
    pub project: Project,
}

/// Lazy project lookup with a per-run cache keyed by expanded path.
///
/// Negative results are cached too, so each distinct path costs at most one
/// remote call. With `allow_duplicates` off, rows naming an already-yielded
/// project are dropped.
pub struct ProjectResolver<'r, I> {
    remote: &'r dyn RemoteService,
    rows: I,
    template: String,
    allow_duplicates: bool,
    cache: HashMap<String, Option<Project>>,
}

impl<'r, I, T> ProjectResolver<'r, I>
where
    I: Iterator<Item = Result<T, Error>>,
    T: AsRef<Entry>,
{
    pub fn new(remote: &'r dyn RemoteService, rows: I, template: &str, allow_duplicates: bool) -> Self {
        Self {
            remote,
            rows,
            template: template.to_string(),
            allow_duplicates,
            cache: HashMap::new(),
        }
    }
}

impl<I, T> Iterator for ProjectResolver<'_, I>
where
    I: Iterator<Item = Result<T, Error>>,
    T: AsRef<Entry>,
{
    type Item = Result<ResolvedProject<T>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };

            let path = match expand(&self.template, row.as_ref()) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", row.as_ref().label("login"), e);
                    continue;
                }
            };

            match self.cache.get(&path) {
                Some(Some(project)) if self.allow_duplicates => {
                    let project = project.clone();
                    return Some(Ok(ResolvedProject { row, path, project }));
                }
                Some(Some(_)) => {
                    tracing::debug!("Project {} already processed, skipping", path);
                    continue;
                }
                Some(None) => {
                    tracing::warn!("Project {} not found", path);
                    continue;
                }
                None => {}
            }

            match self.remote.get_project(&path) {
                Ok(project) => {
                    self.cache.insert(path.clone(), Some(project.clone()));
                    return Some(Ok(ResolvedProject { row, path, project }));
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!("Project {} not found", path);
                    self.cache.insert(path, None);
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Entries as infallible resolver input.
pub struct EntryRows<'a>(std::slice::Iter<'a, Entry>);

impl<'a> Iterator for EntryRows<'a> {
    type Item = Result<&'a Entry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(Ok)
    }
}

/// Projects named by `template` for each entry.
pub fn resolve_projects<'a, 'r>(
    remote: &'r dyn RemoteService,
    entries: &'a Entries,
    template: &str,
    allow_duplicates: bool,
) -> ProjectResolver<'r, EntryRows<'a>> {
    ProjectResolver::new(remote, EntryRows(entries.iter()), template, allow_duplicates)
}
