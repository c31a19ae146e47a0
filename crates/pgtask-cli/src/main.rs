use clap::Parser;
use pgtask_core::PgTaskConfig;
use pgtask_resource::{CronStore, PostgresCronStore, TaskId, TaskManager};
use tracing::{info, warn};

mod apply;
mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // load config: --config / PGTASK_CONFIG > ~/.pgtask/pgtask.toml
    let loaded = PgTaskConfig::load(cli.config.as_deref());
    let filter = loaded
        .as_ref()
        .map(|c| c.log.filter.clone())
        .unwrap_or_else(|_| pgtask_core::config::DEFAULT_LOG_FILTER.to_string());

    // logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = loaded.unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        PgTaskConfig::default()
    });

    let store = PostgresCronStore::connect(&config.connection, &config.cron).await?;
    let ctx = store.session_context();
    let tasks = TaskManager::new(store);

    match cli.command {
        Command::Apply(args) => {
            let prior = args.prior.as_deref().map(TaskId::parse).transpose()?;
            let outcome = apply::apply(&tasks, &ctx, args.spec(), prior.as_ref()).await?;
            info!(task = %outcome.id, action = ?outcome.action, "apply complete");
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Read { id } => {
            let id = TaskId::parse(&id)?;
            match tasks.read(&ctx, &id).await? {
                Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
                None => anyhow::bail!("task not found: {id}"),
            }
        }
        Command::Import { id } => {
            let task = tasks.import(&ctx, &id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::Exists { id } => {
            let id = TaskId::parse(&id)?;
            println!("{}", tasks.exists(&ctx, &id).await?);
        }
        Command::Delete { id } => {
            let id = TaskId::parse(&id)?;
            tasks.delete(&ctx, &id).await?;
            info!(task = %id, "delete complete");
        }
    }

    Ok(())
}
