//! Error taxonomy for dotfile operations
//!
//! Every failure falls into one of five kinds (see [`ErrorKind`]) so callers
//! can branch on the kind without parsing messages.

use crate::object::ContentHash;

/// Result type for dotfile operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user input: duplicates, limits, empty values, mismatched confirmation
    Validation,
    /// Unknown alias, user or commit hash
    NotFound,
    /// Dirty working copy, non fast-forward push, or nothing to do
    Conflict,
    /// Stored data does not match its own integrity guarantee
    CorruptChain,
    /// Disk, database, serialization or transport failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::CorruptChain => "corrupt_chain",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User facing validation errors. Never wrapped with internal context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("{what} {value:?} already exists")]
    Duplicate { what: &'static str, value: String },

    #[error("user has the maximum amount of files ({limit})")]
    LimitExceeded { limit: usize },

    #[error("{0}")]
    Invalid(String),
}

/// Errors that can occur during dotfile operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    User(#[from] UserError),

    #[error("{0:?} is not tracked")]
    NotTracked(String),

    #[error("commit {hash} not found in {alias:?}")]
    CommitNotFound { alias: String, hash: ContentHash },

    #[error("user {0:?} not found")]
    UserNotFound(String),

    #[error("{0:?} has no commits")]
    NoCommits(String),

    #[error("working copy {0:?} does not exist")]
    MissingWorkingCopy(String),

    #[error("conflict on {alias:?}: {reason}")]
    Conflict { alias: String, reason: String },

    #[error("no changes")]
    NoChanges,

    #[error("corrupt chain at {hash}: {reason}")]
    CorruptChain { hash: ContentHash, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("remote error: {0}")]
    Remote(String),

    /// A batch sync stopped at `alias`
    #[error("sync of {alias:?} failed: {source}")]
    Aborted {
        alias: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Classify this error into one of the five kinds
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::User(_) => ErrorKind::Validation,
            Error::NotTracked(_)
            | Error::CommitNotFound { .. }
            | Error::UserNotFound(_)
            | Error::NoCommits(_)
            | Error::MissingWorkingCopy(_) => ErrorKind::NotFound,
            Error::Conflict { .. } | Error::NoChanges => ErrorKind::Conflict,
            Error::CorruptChain { .. } => ErrorKind::CorruptChain,
            Error::Io { .. }
            | Error::Database { .. }
            | Error::Serialization(_)
            | Error::Remote(_) => ErrorKind::Internal,
            Error::Aborted { source, .. } => source.kind(),
        }
    }

    pub fn conflict(alias: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Conflict {
            alias: alias.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(hash: &ContentHash, reason: impl std::fmt::Display) -> Self {
        Error::CorruptChain {
            hash: *hash,
            reason: reason.to_string(),
        }
    }

    pub fn is_no_changes(&self) -> bool {
        matches!(self, Error::NoChanges)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Attach operation context to I/O failures
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Io {
            context: f().into(),
            source,
        })
    }
}

/// Attach operation context to database failures
pub trait DbContext<T> {
    fn db_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> DbContext<T> for rusqlite::Result<T> {
    fn db_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Database {
            context: f().into(),
            source,
        })
    }
}
