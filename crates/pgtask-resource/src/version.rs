use serde::Serialize;

use crate::error::StoreError;

/// Server version as reported by the `server_version_num` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ServerVersion(i32);

impl ServerVersion {
    pub fn from_num(num: i32) -> Self {
        Self(num)
    }

    /// Parse the textual `server_version_num` setting, e.g. `"160002"`.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        raw.trim()
            .parse::<i32>()
            .map(Self)
            .map_err(|_| {
                StoreError::Unexpected(format!("server_version_num is not a number: {raw:?}"))
            })
    }

    pub fn num(&self) -> i32 {
        self.0
    }

    pub fn major(&self) -> i32 {
        self.0 / 10_000
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 10+ uses two components (160002 -> 16.2); 9.x uses three (90624 -> 9.6.24).
        if self.0 >= 100_000 {
            write!(f, "{}.{}", self.major(), self.0 % 10_000)
        } else {
            write!(f, "{}.{}.{}", self.major(), (self.0 / 100) % 100, self.0 % 100)
        }
    }
}

/// Server-version-gated capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// `pg_cron` backed scheduled tasks.
    Task,
}

impl Feature {
    pub fn min_version(&self) -> ServerVersion {
        match self {
            // pg_cron supports PostgreSQL 10 and newer.
            Feature::Task => ServerVersion(100_000),
        }
    }

    pub fn supported_by(&self, version: ServerVersion) -> bool {
        version >= self.min_version()
    }
}
