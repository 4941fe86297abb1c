//! GB-001: Error taxonomy for commands, resolution and the remote service.

use thiserror::Error;

/// Failure reported by the remote service (or the HTTP layer underneath it).
///
/// `NotFound`, `Conflict`, `BadRequest` and `NotModified` are the declared
/// outcomes callers branch on; the rest are unexpected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not modified: {0}")]
    NotModified(String),

    #[error("{operation} failed with status {status}: {message}")]
    Http {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{operation} request failed: {message}")]
    Transport { operation: String, message: String },

    #[error("cannot decode {operation} response: {message}")]
    Decode { operation: String, message: String },

    #[error("{0} cannot be modified in place")]
    Unsupported(&'static str),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Any error a command invocation can end with.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required option --{0}")]
    MissingParameter(String),

    #[error("invalid access level '{0}' (expected one of: {levels})", levels = super::types::AccessLevel::names().join(", "))]
    InvalidAccessLevel(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("account '{0}' not found")]
    AccountNotFound(String),

    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("template '{template}' refers to unknown column '{column}'")]
    TemplateColumnMissing { template: String, column: String },

    #[error("malformed template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("local file {0} does not exist")]
    LocalFileMissing(String),

    #[error("invalid deadline '{0}'")]
    InvalidDeadline(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("cannot read {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// True for failures that only concern the row being processed.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::ProjectNotFound(_)
                | Self::TemplateColumnMissing { .. }
                | Self::Remote(RemoteError::NotFound(_))
        )
    }
}
