use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};

pub const DEFAULT_SCHEMA: &str = "public";

/// Connection-scoped facts every operation needs.
///
/// Passed explicitly so "defaults to the current database" does not depend on
/// ambient session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Database the connection is attached to (`current_database()`).
    pub database: String,
}

impl SessionContext {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }
}

/// Composite task key: `database.schema.name`.
///
/// This string is the `jobname` of the backing job and the only external
/// handle on a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub database: String,
    pub schema: String,
    pub name: String,
}

impl TaskId {
    /// Build an identifier from its parts.
    ///
    /// `database` and `schema` must be non-empty and free of dots, otherwise
    /// the formatted jobname would not parse back into the same parts.
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let id = Self {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
        };
        for (part, value) in [("database", &id.database), ("schema", &id.schema)] {
            check_namespace(part, value).map_err(TaskError::InvalidIdentifier)?;
        }
        if id.name.is_empty() {
            return Err(TaskError::InvalidIdentifier(format!(
                "name must not be empty: {}",
                id.format()
            )));
        }
        Ok(id)
    }

    /// Return the canonical `database.schema.name` string.
    pub fn format(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.name)
    }

    /// Parse an identifier string.
    ///
    /// Splits on the first two dots only, so the name part may itself contain
    /// dots. All three parts must be non-empty.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '.');
        let (Some(database), Some(schema), Some(name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(TaskError::InvalidIdentifier(format!(
                "expected database.schema.name: {s}"
            )));
        };
        Self::new(database, schema, name)
    }
}

/// A database or schema segment of an identifier.
fn check_namespace(part: &str, value: &str) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err(format!("{part} must not be empty"));
    }
    if value.contains('.') {
        return Err(format!("{part} must not contain '.': {value}"));
    }
    Ok(())
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

/// Desired configuration of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Defaults to the session database when unset or empty.
    #[serde(default)]
    pub database: Option<String>,
    /// Defaults to `public` when unset or empty.
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    pub query: String,
    /// Cron-style expression understood by the extension.
    pub schedule: String,
}

impl TaskSpec {
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            database: None,
            schema: None,
            name: name.into(),
            query: query.into(),
            schedule: schedule.into(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Explicitly set database, treating an empty string as unset.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref().filter(|s| !s.is_empty())
    }

    /// Explicitly set schema, treating an empty string as unset.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref().filter(|s| !s.is_empty())
    }

    pub fn resolved_database<'a>(&'a self, ctx: &'a SessionContext) -> &'a str {
        self.database().unwrap_or(ctx.database.as_str())
    }

    pub fn resolved_schema(&self) -> &str {
        self.schema().unwrap_or(DEFAULT_SCHEMA)
    }

    /// Derive the identifier this spec maps to under `ctx`.
    ///
    /// Fails when the resolved database or schema contains a dot, including a
    /// database inherited from the session.
    pub fn task_id(&self, ctx: &SessionContext) -> Result<TaskId> {
        let database = self.resolved_database(ctx);
        let schema = self.resolved_schema();
        for (attr, value) in [("database", database), ("schema", schema)] {
            check_namespace(attr, value).map_err(TaskError::InvalidSpec)?;
        }
        TaskId::new(database, schema, &self.name)
    }

    pub fn validate(&self) -> Result<()> {
        for (attr, value) in [
            ("name", &self.name),
            ("query", &self.query),
            ("schedule", &self.schedule),
        ] {
            if value.trim().is_empty() {
                return Err(TaskError::InvalidSpec(format!("{attr} is required")));
            }
        }
        for (attr, value) in [("database", self.database()), ("schema", self.schema())] {
            if let Some(value) = value {
                check_namespace(attr, value).map_err(TaskError::InvalidSpec)?;
            }
        }
        Ok(())
    }

    /// Fill unset optional attributes from the live record.
    pub fn inherit(mut self, current: &ScheduledTask) -> Self {
        if self.database().is_none() {
            self.database = Some(current.database.clone());
        }
        if self.schema().is_none() {
            self.schema = Some(current.schema.clone());
        }
        self
    }
}

/// Observed state of a task, as read back from the jobs table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub database: String,
    pub schema: String,
    pub name: String,
    pub query: String,
    pub schedule: String,
}

impl ScheduledTask {
    pub fn id(&self) -> Result<TaskId> {
        TaskId::new(&self.database, &self.schema, &self.name)
    }

    /// Decompose a job row back into task attributes.
    pub fn from_job(row: JobRow) -> Result<Self> {
        let jobname = row
            .jobname
            .ok_or_else(|| TaskError::InvalidIdentifier("job has no name".to_string()))?;
        let id = TaskId::parse(&jobname)?;
        Ok(Self {
            database: id.database,
            schema: id.schema,
            name: id.name,
            query: row.command,
            schedule: row.schedule,
        })
    }
}

/// Row of `<extension schema>.job` as selected by the stores.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct JobRow {
    /// Database the job runs in.
    pub database: String,
    /// `pg_cron` allows unnamed jobs; tasks always set it.
    pub jobname: Option<String>,
    pub command: String,
    pub schedule: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_defaults_to_session_database_and_public_schema() {
        let ctx = SessionContext::new("postgres");
        let spec = TaskSpec::new("basic_task", "SELECT 1;", "0 * * * *");
        assert_eq!(spec.task_id(&ctx).unwrap().format(), "postgres.public.basic_task");
    }

    #[test]
    fn empty_optionals_count_as_unset() {
        let ctx = SessionContext::new("postgres");
        let spec = TaskSpec::new("t", "SELECT 1;", "0 * * * *")
            .with_database("")
            .with_schema("");
        assert_eq!(spec.task_id(&ctx).unwrap().format(), "postgres.public.t");
    }

    #[test]
    fn explicit_database_and_schema_win() {
        let ctx = SessionContext::new("postgres");
        let spec = TaskSpec::new("t", "SELECT 1;", "0 * * * *")
            .with_database("analytics")
            .with_schema("my_schema");
        assert_eq!(spec.task_id(&ctx).unwrap().format(), "analytics.my_schema.t");
    }

    #[test]
    fn parse_roundtrip() {
        let id = TaskId::new("db", "public", "nightly").unwrap();
        assert_eq!(TaskId::parse(&id.format()).unwrap(), id);
    }

    #[test]
    fn parse_keeps_dots_in_name() {
        let id = TaskId::parse("db.public.report.v2").unwrap();
        assert_eq!(id.database, "db");
        assert_eq!(id.schema, "public");
        assert_eq!(id.name, "report.v2");
    }

    #[test]
    fn parse_rejects_short_or_empty() {
        assert!(TaskId::parse("basic_task").is_err());
        assert!(TaskId::parse("db.basic_task").is_err());
        assert!(TaskId::parse("db..basic_task").is_err());
        assert!(TaskId::parse("db.public.").is_err());
    }

    #[test]
    fn new_rejects_dotted_namespace() {
        assert!(TaskId::new("my.db", "public", "t").is_err());
        assert!(TaskId::new("db", "my.schema", "t").is_err());
        assert!(TaskId::new("db", "public", "").is_err());
        // dots in the name survive a round trip
        let id = TaskId::new("db", "public", "report.v2").unwrap();
        assert_eq!(TaskId::parse(&id.format()).unwrap(), id);
    }

    #[test]
    fn dotted_session_database_cannot_derive_an_id() {
        let ctx = SessionContext::new("my.db");
        let spec = TaskSpec::new("t", "SELECT 1;", "0 * * * *");
        assert!(spec.validate().is_ok());
        assert!(matches!(spec.task_id(&ctx), Err(TaskError::InvalidSpec(_))));

        let spec = spec.with_database("app");
        assert_eq!(spec.task_id(&ctx).unwrap().format(), "app.public.t");
    }

    #[test]
    fn validate_requires_fields() {
        assert!(TaskSpec::new("t", "SELECT 1;", "0 * * * *").validate().is_ok());
        assert!(TaskSpec::new("", "SELECT 1;", "0 * * * *").validate().is_err());
        assert!(TaskSpec::new("t", "  ", "0 * * * *").validate().is_err());
        assert!(TaskSpec::new("t", "SELECT 1;", "").validate().is_err());
    }

    #[test]
    fn validate_rejects_dotted_namespace() {
        let spec = TaskSpec::new("t", "SELECT 1;", "0 * * * *").with_schema("a.b");
        assert!(matches!(spec.validate(), Err(TaskError::InvalidSpec(_))));
    }

    #[test]
    fn inherit_fills_only_unset() {
        let current = ScheduledTask {
            database: "analytics".to_string(),
            schema: "ops".to_string(),
            name: "t".to_string(),
            query: "SELECT 1;".to_string(),
            schedule: "0 * * * *".to_string(),
        };
        let spec = TaskSpec::new("t", "SELECT 2;", "0 * * * *").with_schema("other");
        let spec = spec.inherit(&current);
        assert_eq!(spec.database.as_deref(), Some("analytics"));
        assert_eq!(spec.schema.as_deref(), Some("other"));
    }

    #[test]
    fn from_job_splits_jobname() {
        let row = JobRow {
            database: "postgres".to_string(),
            jobname: Some("postgres.public.basic_task".to_string()),
            command: "SELECT 1;".to_string(),
            schedule: "0 * * * *".to_string(),
        };
        let task = ScheduledTask::from_job(row).unwrap();
        assert_eq!(task.database, "postgres");
        assert_eq!(task.schema, "public");
        assert_eq!(task.name, "basic_task");
        assert_eq!(task.id().unwrap().format(), "postgres.public.basic_task");
    }

    #[test]
    fn spec_deserializes_without_optionals() {
        let spec: TaskSpec = serde_json::from_str(
            r#"{"name":"t","query":"SELECT 1;","schedule":"0 * * * *"}"#,
        )
        .unwrap();
        assert_eq!(spec.database, None);
        assert_eq!(spec.schema, None);
    }
}
