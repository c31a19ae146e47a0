use thiserror::Error;

use crate::version::ServerVersion;

/// SQLSTATE raised when a schema referenced by a statement is missing.
pub const SQLSTATE_INVALID_SCHEMA_NAME: &str = "3F000";
/// SQLSTATE raised when a table or view referenced by a statement is missing.
pub const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";
/// SQLSTATE the extension uses for a malformed schedule.
pub const SQLSTATE_INVALID_PARAMETER_VALUE: &str = "22023";
/// SQLSTATE raised when the role lacks a privilege on the object.
pub const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE used by the extension for errors it raises without a code.
pub const SQLSTATE_INTERNAL_ERROR: &str = "XX000";

/// Failures reported by a [`crate::store::CronStore`] or its transactions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sqlx / PostgreSQL error.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A statement rejected by a store that is not backed by sqlx.
    #[error("{message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },

    /// The server answered with something we could not interpret.
    #[error("Unexpected server response: {0}")]
    Unexpected(String),
}

/// Failures the lifecycle operations treat as "already gone".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// The extension schema was dropped, taking every job with it.
    ExtensionSchemaMissing,
    /// `unschedule` found no job with the requested name.
    JobMissing,
    /// The jobs relation itself does not exist.
    JobTableMissing,
}

impl StoreError {
    pub fn rejected(code: &str, message: impl Into<String>) -> Self {
        StoreError::Rejected {
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    /// SQLSTATE reported by the server, when there is one.
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            StoreError::Database(e) => e
                .as_database_error()
                .and_then(|db| db.code())
                .map(|code| code.into_owned()),
            StoreError::Rejected { code, .. } => code.clone(),
            StoreError::Unexpected(_) => None,
        }
    }

    /// Primary message text, without the driver's wrapping.
    pub fn message(&self) -> String {
        match self {
            StoreError::Database(e) => match e.as_database_error() {
                Some(db) => db.message().to_string(),
                None => e.to_string(),
            },
            StoreError::Rejected { message, .. } => message.clone(),
            StoreError::Unexpected(msg) => msg.clone(),
        }
    }

    /// Classify the error as one of the expected-absence signatures.
    ///
    /// SQLSTATE is checked first. `pg_cron` raises "job not found" without a
    /// dedicated code, and older servers wrap some errors, so the message text
    /// is matched as a fallback.
    pub fn absence(&self) -> Option<Absence> {
        let code = self.sqlstate();
        let message = self.message();

        if message.contains("could not find valid entry for job") {
            return Some(Absence::JobMissing);
        }
        match code.as_deref() {
            Some(SQLSTATE_INVALID_SCHEMA_NAME) => return Some(Absence::ExtensionSchemaMissing),
            Some(SQLSTATE_UNDEFINED_TABLE) => return Some(Absence::JobTableMissing),
            _ => {}
        }
        if message.ends_with("does not exist") {
            if message.starts_with("schema \"") {
                return Some(Absence::ExtensionSchemaMissing);
            }
            if message.starts_with("relation \"") {
                return Some(Absence::JobTableMissing);
            }
        }
        None
    }
}

/// Errors surfaced by the task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The server is too old for the scheduling extension.
    #[error(
        "scheduled tasks are not supported for this PostgreSQL version ({version}); \
         upgrade the server"
    )]
    UnsupportedVersion { version: ServerVersion },

    /// The scheduling extension is not installed in the connected database.
    #[error(
        "the {extension} extension must be installed on the database before a task is \
         created; install the extension first"
    )]
    ExtensionMissing { extension: String },

    /// The string is not a `database.schema.name` identifier.
    #[error("invalid task identifier: {0}")]
    InvalidIdentifier(String),

    /// The desired configuration is incomplete or malformed.
    #[error("invalid task definition: {0}")]
    InvalidSpec(String),

    /// An update would change the identifier, which needs destroy and create.
    #[error("task {prior} cannot be updated in place to {next}; it must be replaced")]
    RequiresReplacement { prior: String, next: String },

    /// Import of an identifier with no live job.
    #[error("task not found: {id}")]
    NotFound { id: String },

    /// Any unclassified failure opening, executing or committing a transaction.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TaskError {
    /// Short error code string, suitable for machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            TaskError::UnsupportedVersion { .. } => "UNSUPPORTED_VERSION",
            TaskError::ExtensionMissing { .. } => "EXTENSION_MISSING",
            TaskError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            TaskError::InvalidSpec(_) => "INVALID_SPEC",
            TaskError::RequiresReplacement { .. } => "REQUIRES_REPLACEMENT",
            TaskError::NotFound { .. } => "NOT_FOUND",
            TaskError::Store(_) => "STORE_ERROR",
        }
    }

    /// True for failures that need operator action rather than a retry.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            TaskError::UnsupportedVersion { .. } | TaskError::ExtensionMissing { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
