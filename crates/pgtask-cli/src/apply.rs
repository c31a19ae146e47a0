use pgtask_resource::{
    diff, Change, CronStore, Result, ScheduledTask, SessionContext, TaskError, TaskId,
    TaskManager, TaskSpec,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Replaced,
    Unchanged,
}

#[derive(Debug, Serialize)]
pub struct ApplyOutcome {
    pub action: Action,
    pub id: String,
    pub task: ScheduledTask,
}

/// Bring the live task in line with `spec`.
///
/// Without `prior` (or when the prior task no longer exists) the task is
/// created. Otherwise the live record is diffed against `spec`: query-only
/// changes, and replacements that keep the identifier, go through update;
/// an identifier change destroys the old task before creating the new one.
pub async fn apply<S: CronStore>(
    tasks: &TaskManager<S>,
    ctx: &SessionContext,
    spec: TaskSpec,
    prior: Option<&TaskId>,
) -> Result<ApplyOutcome> {
    let current = match prior {
        Some(id) => tasks.read(ctx, id).await?.map(|task| (id, task)),
        None => None,
    };

    let (action, id) = match current {
        None => (Action::Created, tasks.create(ctx, &spec).await?),
        Some((prior, task)) => {
            let spec = spec.inherit(&task);
            match diff(&spec, &task) {
                Change::None => (Action::Unchanged, prior.clone()),
                Change::InPlace(_) => (Action::Updated, tasks.update(ctx, prior, &spec).await?),
                Change::Replace(attrs) => {
                    info!(task = %prior, ?attrs, "attributes force replacement");
                    if spec.task_id(ctx)? == *prior {
                        (Action::Replaced, tasks.update(ctx, prior, &spec).await?)
                    } else {
                        tasks.delete(ctx, prior).await?;
                        (Action::Replaced, tasks.create(ctx, &spec).await?)
                    }
                }
            }
        }
    };

    let task = tasks
        .read(ctx, &id)
        .await?
        .ok_or_else(|| TaskError::NotFound { id: id.format() })?;
    Ok(ApplyOutcome {
        action,
        id: id.format(),
        task,
    })
}
