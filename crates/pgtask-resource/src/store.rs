use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{JobRow, SessionContext};
use crate::version::ServerVersion;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A database that hosts the scheduling extension.
#[async_trait]
pub trait CronStore: Send + Sync {
    /// Store name for logging.
    fn name(&self) -> &str;

    /// Version probed when the store was opened.
    fn server_version(&self) -> ServerVersion;

    /// Name of the extension checked by the preconditions (e.g. `pg_cron`).
    fn extension(&self) -> &str;

    /// Facts about the connection, for callers that do not build their own.
    fn session_context(&self) -> SessionContext;

    /// Open a transaction. Dropping it without [`CronTxn::commit`] rolls back.
    async fn begin(&self) -> StoreResult<Box<dyn CronTxn>>;
}

/// One open transaction against a [`CronStore`].
#[async_trait]
pub trait CronTxn: Send {
    /// Whether `extension` is listed in `pg_extension`.
    async fn extension_installed(&mut self, extension: &str) -> StoreResult<bool>;

    async fn job_exists(&mut self, jobname: &str) -> StoreResult<bool>;

    /// Like [`CronTxn::job_exists`], restricted to jobs owned by `database`.
    async fn job_exists_in_database(&mut self, jobname: &str, database: &str)
        -> StoreResult<bool>;

    async fn find_job(&mut self, jobname: &str) -> StoreResult<Option<JobRow>>;

    /// Submit a new job. Fails if `jobname` is already scheduled.
    async fn schedule(&mut self, jobname: &str, schedule: &str, command: &str)
        -> StoreResult<()>;

    /// Remove a job. Fails if no job has that name.
    async fn unschedule(&mut self, jobname: &str) -> StoreResult<()>;

    /// Point the job at `database` if it is recorded elsewhere. Returns the
    /// number of rows changed.
    async fn reassign_database(&mut self, jobname: &str, database: &str) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
