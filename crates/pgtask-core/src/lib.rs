//! Shared configuration and error types for the `pgtask` workspace.

pub mod config;
pub mod error;

pub use config::PgTaskConfig;
pub use error::{CoreError, Result};
