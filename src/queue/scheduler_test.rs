// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::domain::models::blueprint::{
    BlueprintConnection, BlueprintInput, BlueprintMode, BlueprintScope, BlueprintSettings,
};
use crate::domain::models::pipeline_plan::{PipelinePlan, PipelineTask};
use crate::domain::models::subtask::SubTaskMeta;
use crate::domain::plugin::Plugin;
use crate::infrastructure::repositories::blueprint_repo_impl::BlueprintRepoImpl;
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex as SyncMutex;
use sea_orm::Database;
use serde_json::Map;
use std::collections::BTreeMap;

#[derive(Default)]
struct FakeCronRegistry {
    jobs: SyncMutex<BTreeMap<i64, (String, CronJob)>>,
    clears: SyncMutex<usize>,
}

impl FakeCronRegistry {
    fn job(&self, id: i64) -> Option<CronJob> {
        self.jobs.lock().get(&id).map(|(_, job)| job.clone())
    }

    fn cron_of(&self, id: i64) -> Option<String> {
        self.jobs.lock().get(&id).map(|(cron, _)| cron.clone())
    }
}

#[async_trait]
impl CronRegistry for FakeCronRegistry {
    async fn register(&self, blueprint_id: i64, cron: &str, job: CronJob) -> Result<(), SchedulerError> {
        self.jobs.lock().insert(blueprint_id, (cron.to_string(), job));
        Ok(())
    }

    async fn clear(&self) -> Result<(), SchedulerError> {
        self.jobs.lock().clear();
        *self.clears.lock() += 1;
        Ok(())
    }

    async fn registered(&self) -> Vec<i64> {
        self.jobs.lock().keys().copied().collect()
    }
}

#[derive(Default)]
struct FakeExecutor {
    submitted: SyncMutex<Vec<(Option<i64>, PipelinePlan)>>,
}

#[async_trait]
impl PipelineExecutor for FakeExecutor {
    async fn submit(
        &self,
        blueprint_id: Option<i64>,
        plan: PipelinePlan,
        _skip_on_fail: bool,
    ) -> Result<PipelineRecord, PipelineError> {
        self.submitted.lock().push((blueprint_id, plan.clone()));
        Ok(PipelineRecord::new(blueprint_id, plan))
    }
}

struct JiraPlugin {
    metas: Vec<SubTaskMeta>,
}

impl Plugin for JiraPlugin {
    fn name(&self) -> &str {
        "jira"
    }
    fn module_path(&self) -> &str {
        ""
    }
    fn subtask_metas(&self) -> &[SubTaskMeta] {
        &self.metas
    }
}

struct Fixture {
    repo: Arc<BlueprintRepoImpl>,
    cron: Arc<FakeCronRegistry>,
    executor: Arc<FakeExecutor>,
    scheduler: Arc<BlueprintScheduler>,
}

async fn fixture() -> Fixture {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let repo = Arc::new(BlueprintRepoImpl::new(Arc::new(db)));

    let mut registry = PluginRegistry::new();
    registry
        .register(Arc::new(JiraPlugin {
            metas: vec![SubTaskMeta::new("collectIssues", |_| async { Ok(()) })],
        }))
        .unwrap();

    let cron = Arc::new(FakeCronRegistry::default());
    let executor = Arc::new(FakeExecutor::default());
    let scheduler = BlueprintScheduler::new(
        repo.clone(),
        Arc::new(registry),
        cron.clone(),
        executor.clone(),
    );
    Fixture {
        repo,
        cron,
        executor,
        scheduler,
    }
}

fn input(name: &str, cron: &str) -> BlueprintInput {
    BlueprintInput {
        name: name.to_string(),
        project_name: None,
        mode: BlueprintMode::Normal,
        plan: PipelinePlan::default(),
        settings: BlueprintSettings {
            connections: vec![BlueprintConnection {
                plugin_name: "jira".to_string(),
                connection_id: 1,
                scopes: vec![BlueprintScope {
                    scope_id: "10".to_string(),
                    entities: Vec::new(),
                    options: Map::new(),
                }],
            }],
            ..Default::default()
        },
        cron_config: cron.to_string(),
        is_manual: false,
        enable: true,
        skip_on_fail: false,
        labels: Vec::new(),
    }
}

#[test]
fn test_validate_cron() {
    assert!(validate_cron("0 0 * * *").is_ok());
    assert!(validate_cron("*/5 * * * * *").is_ok());
    assert!(validate_cron("Manual").is_ok());
    assert!(matches!(
        validate_cron("every day"),
        Err(SchedulerError::InvalidCron { .. })
    ));
    assert_eq!(normalize_cron(" 0 0 * * * "), "0 0 0 * * *");
}

#[tokio::test]
async fn test_manual_blueprint_is_never_scheduled_but_can_be_triggered() {
    let f = fixture().await;
    let manual = f.repo.create(&input("manual", "manual")).await.unwrap();
    let nightly = f.repo.create(&input("nightly", "0 0 * * *")).await.unwrap();

    assert_eq!(f.scheduler.reload().await.unwrap(), 1);
    assert_eq!(f.cron.registered().await, vec![nightly.id]);
    assert_eq!(f.cron.cron_of(nightly.id).unwrap(), "0 0 0 * * *");
    assert!(f.executor.submitted.lock().is_empty());

    let record = f
        .scheduler
        .fire(manual.id, TriggerOptions::default())
        .await
        .unwrap();
    assert_eq!(record.blueprint_id, Some(manual.id));
    assert_eq!(f.executor.submitted.lock().len(), 1);
}

#[tokio::test]
async fn test_cron_job_regenerates_plan_from_current_settings() {
    let f = fixture().await;
    let blueprint = f.repo.create(&input("nightly", "0 0 * * *")).await.unwrap();
    f.scheduler.reload().await.unwrap();

    // change the scope without reloading; the next tick must see it
    let mut changed = input("nightly", "0 0 * * *");
    changed.settings.connections[0].scopes[0].scope_id = "20".to_string();
    f.repo.update(blueprint.id, &changed).await.unwrap();

    let job = f.cron.job(blueprint.id).unwrap();
    job().await;

    let submitted = f.executor.submitted.lock().clone();
    assert_eq!(submitted.len(), 1);
    let task = &submitted[0].1.stages()[0][0];
    assert_eq!(task.plugin, "jira");
    assert_eq!(task.options["scopeId"], serde_json::json!("20"));
}

#[tokio::test]
async fn test_reload_skips_disabled_and_invalid_cron() {
    let f = fixture().await;
    let mut disabled = input("disabled", "0 0 * * *");
    disabled.enable = false;
    f.repo.create(&disabled).await.unwrap();
    f.repo.create(&input("broken", "not a cron")).await.unwrap();

    assert_eq!(f.scheduler.reload().await.unwrap(), 0);
    assert!(f.cron.registered().await.is_empty());
    assert_eq!(*f.cron.clears.lock(), 1);
}

#[tokio::test]
async fn test_trigger_options_reach_the_plan() {
    let f = fixture().await;
    let blueprint = f.repo.create(&input("bp", "manual")).await.unwrap();

    f.scheduler
        .fire(
            blueprint.id,
            TriggerOptions {
                full_sync: true,
                skip_collectors: true,
            },
        )
        .await
        .unwrap();

    let submitted = f.executor.submitted.lock().clone();
    let options = &submitted[0].1.stages()[0][0].options;
    assert_eq!(options["fullSync"], serde_json::json!(true));
    assert_eq!(options["skipCollectors"], serde_json::json!(true));
}

#[tokio::test]
async fn test_advanced_blueprint_uses_stored_plan() {
    let f = fixture().await;
    let mut advanced = input("advanced", "manual");
    advanced.mode = BlueprintMode::Advanced;
    advanced.plan = PipelinePlan::single(vec![PipelineTask::new("jira")]);
    let blueprint = f.repo.create(&advanced).await.unwrap();

    f.scheduler
        .fire(blueprint.id, TriggerOptions::default())
        .await
        .unwrap();
    assert_eq!(
        f.executor.submitted.lock()[0].1,
        PipelinePlan::single(vec![PipelineTask::new("jira")])
    );
}

#[tokio::test]
async fn test_fire_unknown_blueprint() {
    let f = fixture().await;
    assert!(matches!(
        f.scheduler.fire(99, TriggerOptions::default()).await,
        Err(SchedulerError::BlueprintNotFound(99))
    ));
}
