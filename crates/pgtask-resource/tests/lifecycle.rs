// Lifecycle behaviour of TaskManager against the in-memory pg_cron store.

use pgtask_resource::{
    CronStore, MemoryCronStore, ScheduledTask, ServerVersion, SessionContext, TaskError, TaskId,
    TaskManager, TaskSpec,
};

fn setup() -> (TaskManager<MemoryCronStore>, SessionContext) {
    let store = MemoryCronStore::new("postgres");
    let ctx = store.session_context();
    (TaskManager::new(store), ctx)
}

fn basic() -> TaskSpec {
    TaskSpec::new("basic_task", "SELECT 1;", "0 * * * *")
}

#[tokio::test]
async fn basic_task_round_trip() {
    let (tasks, ctx) = setup();

    let id = tasks.create(&ctx, &basic()).await.unwrap();
    assert_eq!(id.format(), "postgres.public.basic_task");

    let task = tasks.read(&ctx, &id).await.unwrap().expect("task should exist");
    assert_eq!(
        task,
        ScheduledTask {
            database: "postgres".to_string(),
            schema: "public".to_string(),
            name: "basic_task".to_string(),
            query: "SELECT 1;".to_string(),
            schedule: "0 * * * *".to_string(),
        }
    );
}

#[tokio::test]
async fn quotes_in_query_survive() {
    let (tasks, ctx) = setup();
    let spec = TaskSpec::new("basic_task", "SELECT 1 AS \"One\", '2' AS two;\n", "0 * * * *");

    let id = tasks.create(&ctx, &spec).await.unwrap();
    let task = tasks.read(&ctx, &id).await.unwrap().unwrap();
    assert_eq!(task.query, "SELECT 1 AS \"One\", '2' AS two;\n");
}

#[tokio::test]
async fn create_twice_leaves_one_job() {
    let (tasks, ctx) = setup();

    let first = tasks.create(&ctx, &basic()).await.unwrap();
    let second = tasks.create(&ctx, &basic()).await.unwrap();
    assert_eq!(first, second);

    let jobs = tasks.store().jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].jobname.as_deref(), Some("postgres.public.basic_task"));
}

#[tokio::test]
async fn exists_follows_create_and_delete() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();
    assert!(tasks.exists(&ctx, &id).await.unwrap());

    tasks.delete(&ctx, &id).await.unwrap();
    assert!(!tasks.exists(&ctx, &id).await.unwrap());
    assert!(tasks.read(&ctx, &id).await.unwrap().is_none());
    assert!(tasks.verify_absent(&ctx, &id).await.unwrap());
}

#[tokio::test]
async fn delete_never_created_succeeds() {
    let (tasks, ctx) = setup();
    let id = TaskId::new("postgres", "public", "never_created").unwrap();
    tasks.delete(&ctx, &id).await.unwrap();
}

#[tokio::test]
async fn delete_after_extension_removed_succeeds() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();

    tasks.store().drop_extension();
    tasks.delete(&ctx, &id).await.unwrap();
    assert!(tasks.verify_absent(&ctx, &id).await.unwrap());
}

#[tokio::test]
async fn delete_surfaces_other_store_errors() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();

    tasks.store().revoke_execute();
    let err = tasks.delete(&ctx, &id).await.unwrap_err();
    assert_eq!(err.code(), "STORE_ERROR");
    assert!(err.to_string().contains("permission denied for function unschedule"));
    assert!(tasks.exists(&ctx, &id).await.unwrap());
}

#[tokio::test]
async fn dotted_session_database_needs_explicit_database() {
    let store = MemoryCronStore::new("my.db");
    let ctx = store.session_context();
    let tasks = TaskManager::new(store);

    let err = tasks.create(&ctx, &basic()).await.unwrap_err();
    assert!(matches!(err, TaskError::InvalidSpec(_)));
    assert!(tasks.store().jobs().is_empty());

    let spec = basic().with_database("app");
    let id = tasks.create(&ctx, &spec).await.unwrap();
    let task = tasks.read(&ctx, &id).await.unwrap().unwrap();
    assert_eq!(task.database, "app");
    assert_eq!(task.schema, "public");
    assert_eq!(task.name, "basic_task");
}

#[tokio::test]
async fn query_update_keeps_identifier() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();

    let changed = TaskSpec::new("basic_task", "SELECT count(*) FROM pg_class;", "0 * * * *");
    let updated = tasks.update(&ctx, &id, &changed).await.unwrap();
    assert_eq!(updated, id);

    let task = tasks.read(&ctx, &id).await.unwrap().unwrap();
    assert_eq!(task.query, "SELECT count(*) FROM pg_class;");
    assert_eq!(task.schedule, "0 * * * *");
    assert_eq!(task.name, "basic_task");
    assert_eq!(task.schema, "public");
    assert_eq!(task.database, "postgres");
    assert_eq!(tasks.store().jobs().len(), 1);
}

#[tokio::test]
async fn schedule_update_keeps_identifier() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();

    let changed = TaskSpec::new("basic_task", "SELECT 1;", "0 0 * * *");
    tasks.update(&ctx, &id, &changed).await.unwrap();

    let task = tasks.read(&ctx, &id).await.unwrap().unwrap();
    assert_eq!(task.schedule, "0 0 * * *");
    assert_eq!(task.query, "SELECT 1;");
}

#[tokio::test]
async fn update_with_new_identifier_requires_replacement() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();

    let renamed = TaskSpec::new("basic_task2", "SELECT 1;", "0 * * * *");
    let err = tasks.update(&ctx, &id, &renamed).await.unwrap_err();
    assert!(matches!(err, TaskError::RequiresReplacement { .. }));
    // the live job is untouched
    assert!(tasks.exists(&ctx, &id).await.unwrap());
    assert_eq!(tasks.store().jobs().len(), 1);
}

#[tokio::test]
async fn specific_database_is_recorded_on_the_job() {
    let (tasks, ctx) = setup();
    let spec = basic().with_database("analytics").with_schema("my_schema");

    let id = tasks.create(&ctx, &spec).await.unwrap();
    assert_eq!(id.format(), "analytics.my_schema.basic_task");

    // schedule() records the session database; create corrects it
    let jobs = tasks.store().jobs();
    assert_eq!(jobs[0].database, "analytics");
    assert!(!tasks.verify_absent(&ctx, &id).await.unwrap());

    let task = tasks.read(&ctx, &id).await.unwrap().unwrap();
    assert_eq!(task.database, "analytics");
    assert_eq!(task.schema, "my_schema");
}

#[tokio::test]
async fn failed_create_rolls_back_prior_job() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();
    let before = tasks.store().jobid(&id.format());

    let broken = TaskSpec::new("basic_task", "SELECT 2;", "whenever");
    let err = tasks.create(&ctx, &broken).await.unwrap_err();
    assert_eq!(err.code(), "STORE_ERROR");
    assert!(err.to_string().contains("invalid schedule"));

    // the drop of the old job was rolled back with the failed schedule
    assert_eq!(tasks.store().jobid(&id.format()), before);
    let task = tasks.read(&ctx, &id).await.unwrap().unwrap();
    assert_eq!(task.query, "SELECT 1;");
}

#[tokio::test]
async fn recreate_replaces_underlying_job() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();
    let before = tasks.store().jobid(&id.format()).unwrap();

    tasks.create(&ctx, &basic()).await.unwrap();
    let after = tasks.store().jobid(&id.format()).unwrap();
    assert_ne!(before, after);
}

#[tokio::test]
async fn missing_extension_is_a_precondition_error() {
    let store = MemoryCronStore::without_extension("postgres");
    let ctx = store.session_context();
    let tasks = TaskManager::new(store);

    let err = tasks.create(&ctx, &basic()).await.unwrap_err();
    assert!(err.is_precondition());
    assert!(matches!(err, TaskError::ExtensionMissing { .. }));
    assert!(err.to_string().contains("install the extension first"));

    let id = basic().task_id(&ctx).unwrap();
    assert!(tasks.read(&ctx, &id).await.unwrap_err().is_precondition());
    assert!(tasks.exists(&ctx, &id).await.unwrap_err().is_precondition());
}

#[tokio::test]
async fn old_server_is_a_precondition_error() {
    let store = MemoryCronStore::new("postgres").with_version(ServerVersion::from_num(90624));
    let ctx = store.session_context();
    let tasks = TaskManager::new(store);

    let err = tasks.create(&ctx, &basic()).await.unwrap_err();
    assert!(matches!(err, TaskError::UnsupportedVersion { .. }));

    let id = basic().task_id(&ctx).unwrap();
    let err = tasks.delete(&ctx, &id).await.unwrap_err();
    assert!(err.is_precondition());
}

#[tokio::test]
async fn invalid_spec_is_rejected_before_touching_the_store() {
    let (tasks, ctx) = setup();
    let err = tasks
        .create(&ctx, &TaskSpec::new("basic_task", "", "0 * * * *"))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::InvalidSpec(_)));
    assert!(tasks.store().jobs().is_empty());
}

#[tokio::test]
async fn import_by_identifier() {
    let (tasks, ctx) = setup();
    let spec = basic().with_schema("my_schema");
    tasks.create(&ctx, &spec).await.unwrap();

    let task = tasks.import(&ctx, "postgres.my_schema.basic_task").await.unwrap();
    assert_eq!(task.name, "basic_task");
    assert_eq!(task.schema, "my_schema");

    let err = tasks.import(&ctx, "postgres.my_schema.other").await.unwrap_err();
    assert!(matches!(err, TaskError::NotFound { .. }));

    let err = tasks.import(&ctx, "basic_task").await.unwrap_err();
    assert!(matches!(err, TaskError::InvalidIdentifier(_)));
}

#[tokio::test]
async fn sessions_on_other_databases_share_jobs() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();

    let other = TaskManager::new(tasks.store().session("analytics"));
    let other_ctx = other.store().session_context();
    assert_eq!(other_ctx.database, "analytics");
    assert!(other.exists(&other_ctx, &id).await.unwrap());
}

#[tokio::test]
async fn verify_absent_checks_owning_database() {
    let (tasks, ctx) = setup();
    let id = tasks.create(&ctx, &basic()).await.unwrap();
    assert!(!tasks.verify_absent(&ctx, &id).await.unwrap());

    // same jobname under another database prefix is a different task
    let elsewhere = TaskId::new("analytics", "public", "basic_task").unwrap();
    assert!(tasks.verify_absent(&ctx, &elsewhere).await.unwrap());
}
