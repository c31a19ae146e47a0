use tracing::{debug, info, instrument, warn};

use crate::error::{Absence, Result, TaskError};
use crate::store::{CronStore, CronTxn};
use crate::types::{ScheduledTask, SessionContext, TaskId, TaskSpec};
use crate::version::Feature;

/// Lifecycle operations for `pg_cron` backed tasks.
///
/// Every operation opens exactly one transaction on the store and either
/// commits it or lets it roll back on the way out.
pub struct TaskManager<S> {
    store: S,
}

impl<S: CronStore> TaskManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Schedule the job for `spec`, replacing any job with the same identifier.
    ///
    /// Drop, schedule and the database fix-up share one transaction, so a
    /// failure at any step leaves the previous job untouched.
    #[instrument(skip(self, ctx, spec), fields(store = self.store.name(), name = %spec.name))]
    pub async fn create(&self, ctx: &SessionContext, spec: &TaskSpec) -> Result<TaskId> {
        spec.validate()?;
        let id = spec.task_id(ctx)?;
        self.schedule_task(ctx, spec, &id).await?;
        info!(task = %id, "task created");
        Ok(id)
    }

    /// Look up a task. `Ok(None)` means the job does not exist.
    #[instrument(skip(self, ctx), fields(store = self.store.name(), task = %id))]
    pub async fn read(&self, ctx: &SessionContext, id: &TaskId) -> Result<Option<ScheduledTask>> {
        let mut txn = self.store.begin().await?;
        self.check_preconditions(txn.as_mut()).await?;

        let jobname = id.format();
        let Some(row) = txn.find_job(&jobname).await? else {
            warn!(database = %ctx.database, "task not found");
            return Ok(None);
        };
        txn.commit().await?;

        let task = ScheduledTask::from_job(row)?;
        debug!(schedule = %task.schedule, "task read");
        Ok(Some(task))
    }

    /// Recreate the job of an existing task under the same identifier.
    ///
    /// Only the query can change in place. If `spec` derives a different
    /// identifier than `prior`, the task has to be replaced instead.
    #[instrument(skip(self, ctx, spec), fields(store = self.store.name(), task = %prior))]
    pub async fn update(
        &self,
        ctx: &SessionContext,
        prior: &TaskId,
        spec: &TaskSpec,
    ) -> Result<TaskId> {
        spec.validate()?;
        let id = spec.task_id(ctx)?;
        if &id != prior {
            return Err(TaskError::RequiresReplacement {
                prior: prior.format(),
                next: id.format(),
            });
        }
        self.schedule_task(ctx, spec, &id).await?;
        info!("task updated");
        Ok(id)
    }

    /// Unschedule the job. A job that is already gone, or whose extension
    /// was dropped first, counts as deleted.
    #[instrument(skip(self, _ctx), fields(store = self.store.name(), task = %id))]
    pub async fn delete(&self, _ctx: &SessionContext, id: &TaskId) -> Result<()> {
        self.check_version()?;

        let mut txn = self.store.begin().await?;
        match txn.unschedule(&id.format()).await {
            Ok(()) => {}
            Err(e) => match e.absence() {
                Some(Absence::ExtensionSchemaMissing) => {
                    info!("extension removed before the task; nothing to delete");
                    return Ok(());
                }
                Some(Absence::JobMissing) => {
                    info!("task already absent");
                    return Ok(());
                }
                _ => return Err(e.into()),
            },
        }
        txn.commit().await?;
        info!("task deleted");
        Ok(())
    }

    #[instrument(skip(self, _ctx), fields(store = self.store.name(), task = %id))]
    pub async fn exists(&self, _ctx: &SessionContext, id: &TaskId) -> Result<bool> {
        let mut txn = self.store.begin().await?;
        self.check_preconditions(txn.as_mut()).await?;
        let exists = txn.job_exists(&id.format()).await?;
        txn.commit().await?;
        Ok(exists)
    }

    /// Adopt an existing job by its full `database.schema.name` identifier.
    #[instrument(skip(self, ctx), fields(store = self.store.name()))]
    pub async fn import(&self, ctx: &SessionContext, raw_id: &str) -> Result<ScheduledTask> {
        let id = TaskId::parse(raw_id)?;
        self.read(ctx, &id)
            .await?
            .ok_or_else(|| TaskError::NotFound { id: id.format() })
    }

    /// Whether a deleted task is really gone: no job with that name owned by
    /// the identifier's database. A missing job table counts as gone.
    #[instrument(skip(self, _ctx), fields(store = self.store.name(), task = %id))]
    pub async fn verify_absent(&self, _ctx: &SessionContext, id: &TaskId) -> Result<bool> {
        let mut txn = self.store.begin().await?;
        match txn.job_exists_in_database(&id.format(), &id.database).await {
            Ok(exists) => {
                txn.commit().await?;
                Ok(!exists)
            }
            Err(e) if e.absence() == Some(Absence::JobTableMissing) => {
                debug!("job table missing; treating task as absent");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    // --- private helpers ---------------------------------------------------

    async fn schedule_task(
        &self,
        ctx: &SessionContext,
        spec: &TaskSpec,
        id: &TaskId,
    ) -> Result<()> {
        let jobname = id.format();
        let database = spec.resolved_database(ctx);

        let mut txn = self.store.begin().await?;
        self.check_preconditions(txn.as_mut()).await?;

        // schedule() rejects a name that is already taken.
        if txn.job_exists(&jobname).await? {
            debug!(task = %id, "dropping existing job before scheduling");
            txn.unschedule(&jobname).await?;
        }

        txn.schedule(&jobname, &spec.schedule, &spec.query).await?;

        let moved = txn.reassign_database(&jobname, database).await?;
        if moved > 0 {
            debug!(task = %id, %database, "job database corrected");
        }

        txn.commit().await?;
        Ok(())
    }

    fn check_version(&self) -> Result<()> {
        let version = self.store.server_version();
        if !Feature::Task.supported_by(version) {
            return Err(TaskError::UnsupportedVersion { version });
        }
        Ok(())
    }

    async fn check_preconditions(&self, txn: &mut dyn CronTxn) -> Result<()> {
        self.check_version()?;
        let extension = self.store.extension();
        if !txn.extension_installed(extension).await? {
            return Err(TaskError::ExtensionMissing {
                extension: extension.to_string(),
            });
        }
        Ok(())
    }
}
