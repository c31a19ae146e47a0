use serde::Serialize;

use crate::types::{ScheduledTask, TaskSpec};

/// The declarative attributes of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Database,
    Schema,
    Name,
    Query,
    Schedule,
}

impl Attribute {
    pub const ALL: [Attribute; 5] = [
        Attribute::Database,
        Attribute::Schema,
        Attribute::Name,
        Attribute::Query,
        Attribute::Schedule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Database => "database",
            Attribute::Schema => "schema",
            Attribute::Name => "name",
            Attribute::Query => "query",
            Attribute::Schedule => "schedule",
        }
    }

    pub fn required(&self) -> bool {
        matches!(self, Attribute::Name | Attribute::Query | Attribute::Schedule)
    }

    /// Optional attributes whose value is filled in when left unset.
    pub fn computed(&self) -> bool {
        matches!(self, Attribute::Database | Attribute::Schema)
    }

    /// Changing this attribute means destroying the job and creating a new one.
    pub fn forces_replacement(&self) -> bool {
        !matches!(self, Attribute::Query)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Attribute::Database | Attribute::Schema => {
                "Namespaces the task so the same name can be used for different \
                 databases/schemas. The job itself does not live in a database or schema."
            }
            Attribute::Name => "The name of the task.",
            Attribute::Query => "The query run by the task.",
            Attribute::Schedule => "The cron schedule on which to run the task.",
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What it takes to move a live task to the desired configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "attributes", rename_all = "snake_case")]
pub enum Change {
    None,
    /// Only mutable attributes differ; the identifier is kept.
    InPlace(Vec<Attribute>),
    /// At least one immutable attribute differs.
    Replace(Vec<Attribute>),
}

/// Compare desired configuration against the live record.
///
/// An unset computed attribute never counts as a difference: it keeps
/// whatever value the live task already has.
pub fn diff(desired: &TaskSpec, current: &ScheduledTask) -> Change {
    let changed: Vec<Attribute> = Attribute::ALL
        .into_iter()
        .filter(|attr| match desired_value(desired, *attr) {
            Some(value) => value != current_value(current, *attr),
            None => !attr.computed(),
        })
        .collect();

    if changed.is_empty() {
        Change::None
    } else if changed.iter().any(Attribute::forces_replacement) {
        Change::Replace(changed)
    } else {
        Change::InPlace(changed)
    }
}

/// `None` when the attribute is left unset.
fn desired_value(spec: &TaskSpec, attr: Attribute) -> Option<&str> {
    match attr {
        Attribute::Database => spec.database(),
        Attribute::Schema => spec.schema(),
        Attribute::Name => Some(spec.name.as_str()),
        Attribute::Query => Some(spec.query.as_str()),
        Attribute::Schedule => Some(spec.schedule.as_str()),
    }
}

fn current_value(task: &ScheduledTask, attr: Attribute) -> &str {
    match attr {
        Attribute::Database => &task.database,
        Attribute::Schema => &task.schema,
        Attribute::Name => &task.name,
        Attribute::Query => &task.query,
        Attribute::Schedule => &task.schedule,
    }
}
