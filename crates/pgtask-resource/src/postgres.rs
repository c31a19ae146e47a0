use std::time::Duration;

use async_trait::async_trait;
use pgtask_core::config::{ConnectionConfig, CronConfig};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use crate::sql::{self, CronSql};
use crate::store::{CronStore, CronTxn, StoreResult};
use crate::types::{JobRow, SessionContext};
use crate::version::ServerVersion;

/// [`CronStore`] backed by a live PostgreSQL server through a sqlx pool.
pub struct PostgresCronStore {
    pool: PgPool,
    sql: CronSql,
    extension: String,
    version: ServerVersion,
    database: String,
}

impl PostgresCronStore {
    /// Open a pool and probe the server version and current database.
    pub async fn connect(connection: &ConnectionConfig, cron: &CronConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(connection.max_connections)
            .acquire_timeout(Duration::from_secs(connection.acquire_timeout_secs))
            .connect(&connection.url)
            .await?;
        Self::from_pool(pool, cron, connection.database.clone()).await
    }

    /// Wrap an existing pool. `database` overrides `current_database()`.
    pub async fn from_pool(
        pool: PgPool,
        cron: &CronConfig,
        database: Option<String>,
    ) -> StoreResult<Self> {
        let raw = sqlx::query_scalar::<_, String>(sql::SERVER_VERSION_NUM)
            .fetch_one(&pool)
            .await?;
        let version = ServerVersion::parse(&raw)?;

        let database = match database {
            Some(db) => db,
            None => {
                sqlx::query_scalar::<_, String>(sql::CURRENT_DATABASE)
                    .fetch_one(&pool)
                    .await?
            }
        };

        info!(%version, %database, schema = %cron.schema, "connected to PostgreSQL");
        Ok(Self {
            pool,
            sql: CronSql::new(&cron.schema),
            extension: cron.extension.clone(),
            version,
            database,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CronStore for PostgresCronStore {
    fn name(&self) -> &str {
        "postgres"
    }

    fn server_version(&self) -> ServerVersion {
        self.version
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn session_context(&self) -> SessionContext {
        SessionContext::new(&self.database)
    }

    async fn begin(&self) -> StoreResult<Box<dyn CronTxn>> {
        let tx = self.pool.begin().await?;
        debug!("transaction started");
        Ok(Box::new(PgCronTxn {
            tx,
            sql: self.sql.clone(),
        }))
    }
}

/// sqlx rolls the transaction back when it is dropped uncommitted.
struct PgCronTxn {
    tx: Transaction<'static, Postgres>,
    sql: CronSql,
}

#[async_trait]
impl CronTxn for PgCronTxn {
    async fn extension_installed(&mut self, extension: &str) -> StoreResult<bool> {
        let installed = sqlx::query_scalar::<_, bool>(sql::EXTENSION_INSTALLED)
            .bind(extension)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(installed)
    }

    async fn job_exists(&mut self, jobname: &str) -> StoreResult<bool> {
        let stmt = self.sql.job_exists();
        let exists = sqlx::query_scalar::<_, bool>(&stmt)
            .bind(jobname)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn job_exists_in_database(
        &mut self,
        jobname: &str,
        database: &str,
    ) -> StoreResult<bool> {
        let stmt = self.sql.job_exists_in_database();
        let exists = sqlx::query_scalar::<_, bool>(&stmt)
            .bind(jobname)
            .bind(database)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn find_job(&mut self, jobname: &str) -> StoreResult<Option<JobRow>> {
        let stmt = self.sql.find_job();
        let row = sqlx::query_as::<_, JobRow>(&stmt)
            .bind(jobname)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn schedule(&mut self, jobname: &str, schedule: &str, command: &str) -> StoreResult<()> {
        let stmt = self.sql.schedule();
        sqlx::query(&stmt)
            .bind(jobname)
            .bind(schedule)
            .bind(command)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn unschedule(&mut self, jobname: &str) -> StoreResult<()> {
        let stmt = self.sql.unschedule();
        sqlx::query(&stmt)
            .bind(jobname)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn reassign_database(&mut self, jobname: &str, database: &str) -> StoreResult<u64> {
        let stmt = self.sql.reassign_database();
        let result = sqlx::query(&stmt)
            .bind(jobname)
            .bind(database)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        debug!("transaction committed");
        Ok(())
    }
}
