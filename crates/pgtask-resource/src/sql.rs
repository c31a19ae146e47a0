//! Statement text for the PostgreSQL store.
//!
//! Values are always bound as parameters. Only the extension schema is
//! interpolated, and it goes through [`quote_ident`].

pub const SERVER_VERSION_NUM: &str = "SELECT current_setting('server_version_num')";
pub const CURRENT_DATABASE: &str = "SELECT current_database()::text";
pub const EXTENSION_INSTALLED: &str =
    "SELECT count(*) > 0 AS extension_exists FROM pg_extension WHERE extname = $1";

/// Quote an SQL identifier, doubling embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Statements addressing the extension's objects inside `schema`.
#[derive(Debug, Clone)]
pub struct CronSql {
    schema: String,
}

impl CronSql {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: quote_ident(schema),
        }
    }

    pub fn job_exists(&self) -> String {
        format!(
            "SELECT count(*) > 0 AS task_exists FROM {}.job WHERE jobname = $1",
            self.schema
        )
    }

    pub fn job_exists_in_database(&self) -> String {
        format!(
            "SELECT count(*) > 0 AS task_exists FROM {}.job WHERE jobname = $1 AND database = $2",
            self.schema
        )
    }

    pub fn find_job(&self) -> String {
        format!(
            "SELECT j.database, j.jobname, j.command, j.schedule \
             FROM {}.job j WHERE j.jobname = $1",
            self.schema
        )
    }

    /// `schedule(job_name, schedule, command)`; the casts pick the named overload.
    pub fn schedule(&self) -> String {
        format!("SELECT {}.schedule($1::text, $2::text, $3::text)", self.schema)
    }

    /// `unschedule(job_name)`; the cast avoids the job-id overload.
    pub fn unschedule(&self) -> String {
        format!("SELECT {}.unschedule($1::text)", self.schema)
    }

    /// The extension records the database that issued `schedule`, not the
    /// intended one, so the row is corrected afterwards.
    pub fn reassign_database(&self) -> String {
        format!(
            "UPDATE {}.job SET database = $2 WHERE jobname = $1 AND database <> $2",
            self.schema
        )
    }
}
