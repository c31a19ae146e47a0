use clap::{Args, Parser, Subcommand};
use pgtask_resource::{Attribute, TaskSpec};

#[derive(Debug, Parser)]
#[command(name = "pgtask", version, about = "Declarative pg_cron scheduled tasks")]
pub struct Cli {
    /// Config file (default: ~/.pgtask/pgtask.toml).
    #[arg(long, global = true, env = "PGTASK_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the task, or reconcile it with a previously applied one.
    Apply(ApplyArgs),
    /// Print a task as JSON; exits non-zero if it does not exist.
    Read { id: String },
    /// Adopt an existing job by its database.schema.name identifier.
    Import { id: String },
    /// Print `true` or `false`.
    Exists { id: String },
    /// Unschedule a task. Succeeds if it is already gone.
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[arg(long, help = Attribute::Name.description())]
    pub name: String,
    #[arg(long, help = Attribute::Query.description())]
    pub query: String,
    #[arg(long, help = Attribute::Schedule.description())]
    pub schedule: String,
    // defaults to the connection's database
    #[arg(long, help = Attribute::Database.description())]
    pub database: Option<String>,
    // defaults to "public"
    #[arg(long, help = Attribute::Schema.description())]
    pub schema: Option<String>,
    /// Identifier of the task as last applied.
    #[arg(long = "id")]
    pub prior: Option<String>,
}

impl ApplyArgs {
    pub fn spec(&self) -> TaskSpec {
        TaskSpec {
            database: self.database.clone(),
            schema: self.schema.clone(),
            name: self.name.clone(),
            query: self.query.clone(),
            schedule: self.schedule.clone(),
        }
    }
}
