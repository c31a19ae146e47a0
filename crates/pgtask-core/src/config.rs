use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE_URL: &str = "postgres://postgres@localhost:5432/postgres";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 2;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_EXTENSION_NAME: &str = "pg_cron";
pub const DEFAULT_EXTENSION_SCHEMA: &str = "cron";
pub const DEFAULT_LOG_FILTER: &str = "pgtask=info";
pub const ENV_PREFIX: &str = "PGTASK_";

/// Top-level config (pgtask.toml + PGTASK_* env overrides).
///
/// Nested keys are addressed with a double underscore in the environment,
/// e.g. `PGTASK_CONNECTION__URL` or `PGTASK_CRON__SCHEMA`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PgTaskConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Overrides the database reported by `current_database()` when a task
    /// does not name one.
    pub database: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

/// Where the scheduling extension lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Name looked up in `pg_extension`.
    #[serde(default = "default_extension_name")]
    pub extension: String,
    /// Schema holding the `job` table and the schedule/unschedule functions.
    #[serde(default = "default_extension_schema")]
    pub schema: String,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            extension: default_extension_name(),
            schema: default_extension_schema(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}
fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}
fn default_acquire_timeout_secs() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}
fn default_extension_name() -> String {
    DEFAULT_EXTENSION_NAME.to_string()
}
fn default_extension_schema() -> String {
    DEFAULT_EXTENSION_SCHEMA.to_string()
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl PgTaskConfig {
    /// Load config from a TOML file with PGTASK_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.pgtask/pgtask.toml
    ///
    /// A missing file is not an error; every key has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pgtask/pgtask.toml", home)
}
