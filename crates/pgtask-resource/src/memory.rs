use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{
    StoreError, SQLSTATE_INSUFFICIENT_PRIVILEGE, SQLSTATE_INTERNAL_ERROR,
    SQLSTATE_INVALID_PARAMETER_VALUE, SQLSTATE_INVALID_SCHEMA_NAME, SQLSTATE_UNDEFINED_TABLE,
};

const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
use crate::store::{CronStore, CronTxn, StoreResult};
use crate::types::{JobRow, SessionContext};
use crate::version::ServerVersion;

const EXTENSION: &str = "pg_cron";
const SCHEMA: &str = "cron";

/// In-process stand-in for a server with `pg_cron`.
///
/// Follows the extension's observable behaviour closely enough for the
/// lifecycle logic: `schedule` rejects a duplicate name and records the
/// session database, `unschedule` rejects an unknown name, and dropping the
/// extension makes the job table and functions disappear.
#[derive(Clone)]
pub struct MemoryCronStore {
    shared: Arc<Mutex<MemoryState>>,
    database: String,
    version: ServerVersion,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    installed: bool,
    /// EXECUTE on the extension's functions has been revoked.
    revoked: bool,
    jobs: BTreeMap<String, MemoryJob>,
    next_jobid: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoryJob {
    jobid: i64,
    database: String,
    command: String,
    schedule: String,
}

impl MemoryCronStore {
    /// A store connected to `database`, with the extension installed.
    pub fn new(database: impl Into<String>) -> Self {
        let store = Self::without_extension(database);
        store.install_extension();
        store
    }

    pub fn without_extension(database: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MemoryState {
                next_jobid: 1,
                ..MemoryState::default()
            })),
            database: database.into(),
            version: ServerVersion::from_num(160_000),
        }
    }

    pub fn with_version(mut self, version: ServerVersion) -> Self {
        self.version = version;
        self
    }

    /// Another session on the same server, attached to `database`.
    pub fn session(&self, database: impl Into<String>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            database: database.into(),
            version: self.version,
        }
    }

    /// `CREATE EXTENSION pg_cron`.
    pub fn install_extension(&self) {
        self.lock().installed = true;
    }

    /// `DROP EXTENSION pg_cron`; drops the schema and every job with it.
    pub fn drop_extension(&self) {
        let mut state = self.lock();
        state.installed = false;
        state.jobs.clear();
    }

    /// `REVOKE EXECUTE` on `schedule` and `unschedule` for this role. The job
    /// table stays readable.
    pub fn revoke_execute(&self) {
        self.lock().revoked = true;
    }

    /// Committed jobs, ordered by jobname.
    pub fn jobs(&self) -> Vec<JobRow> {
        self.lock()
            .jobs
            .iter()
            .map(|(name, job)| job.to_row(name))
            .collect()
    }

    /// Internal job id of a committed job, which changes when it is recreated.
    pub fn jobid(&self, jobname: &str) -> Option<i64> {
        self.lock().jobs.get(jobname).map(|job| job.jobid)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryJob {
    fn to_row(&self, jobname: &str) -> JobRow {
        JobRow {
            database: self.database.clone(),
            jobname: Some(jobname.to_string()),
            command: self.command.clone(),
            schedule: self.schedule.clone(),
        }
    }
}

#[async_trait]
impl CronStore for MemoryCronStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn server_version(&self) -> ServerVersion {
        self.version
    }

    fn extension(&self) -> &str {
        EXTENSION
    }

    fn session_context(&self) -> SessionContext {
        SessionContext::new(&self.database)
    }

    async fn begin(&self) -> StoreResult<Box<dyn CronTxn>> {
        let snapshot = self.lock().clone();
        Ok(Box::new(MemoryTxn {
            shared: Arc::clone(&self.shared),
            database: self.database.clone(),
            snapshot,
            touched: Vec::new(),
        }))
    }
}

/// Works on a private snapshot; commit publishes only the jobnames it wrote.
struct MemoryTxn {
    shared: Arc<Mutex<MemoryState>>,
    database: String,
    snapshot: MemoryState,
    touched: Vec<String>,
}

impl MemoryTxn {
    fn require_table(&self) -> StoreResult<()> {
        if self.snapshot.installed {
            Ok(())
        } else {
            Err(StoreError::rejected(
                SQLSTATE_UNDEFINED_TABLE,
                format!("relation \"{SCHEMA}.job\" does not exist"),
            ))
        }
    }

    fn require_schema(&self) -> StoreResult<()> {
        if self.snapshot.installed {
            Ok(())
        } else {
            Err(StoreError::rejected(
                SQLSTATE_INVALID_SCHEMA_NAME,
                format!("schema \"{SCHEMA}\" does not exist"),
            ))
        }
    }

    fn require_execute(&self, function: &str) -> StoreResult<()> {
        if self.snapshot.revoked {
            return Err(StoreError::rejected(
                SQLSTATE_INSUFFICIENT_PRIVILEGE,
                format!("permission denied for function {function}"),
            ));
        }
        Ok(())
    }

    fn touch(&mut self, jobname: &str) {
        if !self.touched.iter().any(|name| name == jobname) {
            self.touched.push(jobname.to_string());
        }
    }
}

#[async_trait]
impl CronTxn for MemoryTxn {
    async fn extension_installed(&mut self, extension: &str) -> StoreResult<bool> {
        Ok(extension == EXTENSION && self.snapshot.installed)
    }

    async fn job_exists(&mut self, jobname: &str) -> StoreResult<bool> {
        self.require_table()?;
        Ok(self.snapshot.jobs.contains_key(jobname))
    }

    async fn job_exists_in_database(
        &mut self,
        jobname: &str,
        database: &str,
    ) -> StoreResult<bool> {
        self.require_table()?;
        Ok(self
            .snapshot
            .jobs
            .get(jobname)
            .is_some_and(|job| job.database == database))
    }

    async fn find_job(&mut self, jobname: &str) -> StoreResult<Option<JobRow>> {
        self.require_table()?;
        Ok(self.snapshot.jobs.get(jobname).map(|job| job.to_row(jobname)))
    }

    async fn schedule(&mut self, jobname: &str, schedule: &str, command: &str) -> StoreResult<()> {
        self.require_schema()?;
        self.require_execute("schedule")?;
        if !valid_schedule(schedule) {
            return Err(StoreError::rejected(
                SQLSTATE_INVALID_PARAMETER_VALUE,
                format!("invalid schedule: {schedule}"),
            ));
        }
        if self.snapshot.jobs.contains_key(jobname) {
            return Err(StoreError::rejected(
                SQLSTATE_UNIQUE_VIOLATION,
                format!(
                    "duplicate key value violates unique constraint \"jobname_username_uniq\": \
                     {jobname}"
                ),
            ));
        }
        let jobid = self.snapshot.next_jobid;
        self.snapshot.next_jobid += 1;
        self.snapshot.jobs.insert(
            jobname.to_string(),
            MemoryJob {
                jobid,
                database: self.database.clone(),
                command: command.to_string(),
                schedule: schedule.to_string(),
            },
        );
        self.touch(jobname);
        Ok(())
    }

    async fn unschedule(&mut self, jobname: &str) -> StoreResult<()> {
        self.require_schema()?;
        self.require_execute("unschedule")?;
        if self.snapshot.jobs.remove(jobname).is_none() {
            return Err(StoreError::rejected(
                SQLSTATE_INTERNAL_ERROR,
                format!("could not find valid entry for job '{jobname}'"),
            ));
        }
        self.touch(jobname);
        Ok(())
    }

    async fn reassign_database(&mut self, jobname: &str, database: &str) -> StoreResult<u64> {
        self.require_table()?;
        let Some(job) = self.snapshot.jobs.get_mut(jobname) else {
            return Ok(0);
        };
        if job.database == database {
            return Ok(0);
        }
        job.database = database.to_string();
        self.touch(jobname);
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTxn {
            shared,
            snapshot,
            touched,
            ..
        } = *self;
        let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.installed && !touched.is_empty() {
            return Err(StoreError::rejected(
                SQLSTATE_UNDEFINED_TABLE,
                format!("relation \"{SCHEMA}.job\" does not exist"),
            ));
        }
        for name in &touched {
            match snapshot.jobs.get(name) {
                Some(job) => {
                    state.jobs.insert(name.clone(), job.clone());
                }
                None => {
                    state.jobs.remove(name);
                }
            }
        }
        state.next_jobid = state.next_jobid.max(snapshot.next_jobid);
        debug!(touched = touched.len(), "memory transaction committed");
        Ok(())
    }
}

/// Accepts what the extension accepts: five cron fields, `@` macros, or
/// an interval of 1-59 seconds.
fn valid_schedule(schedule: &str) -> bool {
    let schedule = schedule.trim();
    if let Some(mac) = schedule.strip_prefix('@') {
        return matches!(
            mac,
            "yearly" | "annually" | "monthly" | "weekly" | "daily" | "hourly" | "reboot"
        );
    }
    if let Some(secs) = schedule
        .strip_suffix("seconds")
        .or_else(|| schedule.strip_suffix("second"))
    {
        return secs
            .trim()
            .parse::<u32>()
            .is_ok_and(|n| (1..=59).contains(&n));
    }
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    fields.len() == 5
        && fields.iter().all(|field| {
            field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | ',' | '-' | '/' | '$'))
        })
}
