//! `pgtask-resource`: declarative lifecycle for `pg_cron` scheduled tasks.
//!
//! # Overview
//!
//! A task is a single `pg_cron` job whose `jobname` is the composite
//! identifier `database.schema.name`. The [`manager::TaskManager`] creates,
//! reads, updates and deletes that job, each call inside exactly one store
//! transaction that is rolled back on every path that does not commit.
//!
//! # Attributes
//!
//! | Attribute  | Required | Forces replacement | Default            |
//! |------------|----------|--------------------|--------------------|
//! | `database` | no       | yes                | session database   |
//! | `schema`   | no       | yes                | `public`           |
//! | `name`     | yes      | yes                |                    |
//! | `query`    | yes      | no                 |                    |
//! | `schedule` | yes      | yes                |                    |
//!
//! # Stores
//!
//! [`postgres::PostgresCronStore`] talks to a live server through sqlx.
//! [`memory::MemoryCronStore`] emulates the extension in-process.

pub mod error;
pub mod manager;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod sql;
pub mod store;
pub mod types;
pub mod version;

pub use error::{Absence, Result, StoreError, TaskError};
pub use manager::TaskManager;
pub use memory::MemoryCronStore;
pub use postgres::PostgresCronStore;
pub use schema::{diff, Attribute, Change};
pub use store::{CronStore, CronTxn};
pub use types::{JobRow, ScheduledTask, SessionContext, TaskId, TaskSpec};
pub use version::{Feature, ServerVersion};
