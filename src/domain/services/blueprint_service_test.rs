// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::domain::models::blueprint::{BlueprintConnection, BlueprintScope, BlueprintSettings};
use crate::domain::models::pipeline_plan::{PipelinePlan, PipelineTask};
use crate::domain::models::subtask::SubTaskMeta;
use crate::domain::plugin::Plugin;
use crate::infrastructure::repositories::blueprint_repo_impl::BlueprintRepoImpl;
use crate::queue::scheduler::{CronJob, CronRegistry};
use crate::utils::errors::PipelineError;
use crate::workers::pipeline_runner::PipelineExecutor;
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::Database;
use serde_json::Map;
use std::collections::BTreeMap;

#[derive(Default)]
struct MemoryCron {
    jobs: Mutex<BTreeMap<i64, String>>,
}

#[async_trait]
impl CronRegistry for MemoryCron {
    async fn register(&self, blueprint_id: i64, cron: &str, _job: CronJob) -> Result<(), SchedulerError> {
        self.jobs.lock().insert(blueprint_id, cron.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SchedulerError> {
        self.jobs.lock().clear();
        Ok(())
    }

    async fn registered(&self) -> Vec<i64> {
        self.jobs.lock().keys().copied().collect()
    }
}

#[derive(Default)]
struct CountingExecutor {
    runs: Mutex<Vec<Option<i64>>>,
}

#[async_trait]
impl PipelineExecutor for CountingExecutor {
    async fn submit(
        &self,
        blueprint_id: Option<i64>,
        plan: PipelinePlan,
        _skip_on_fail: bool,
    ) -> Result<PipelineRecord, PipelineError> {
        self.runs.lock().push(blueprint_id);
        Ok(PipelineRecord::new(blueprint_id, plan))
    }
}

struct GitlabPlugin {
    metas: Vec<SubTaskMeta>,
}

impl Plugin for GitlabPlugin {
    fn name(&self) -> &str {
        "gitlab"
    }
    fn module_path(&self) -> &str {
        ""
    }
    fn subtask_metas(&self) -> &[SubTaskMeta] {
        &self.metas
    }
}

async fn service() -> (BlueprintService, Arc<MemoryCron>, Arc<CountingExecutor>) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let repo = Arc::new(BlueprintRepoImpl::new(Arc::new(db)));

    let mut registry = PluginRegistry::new();
    registry
        .register(Arc::new(GitlabPlugin {
            metas: vec![SubTaskMeta::new("collectMrs", |_| async { Ok(()) })],
        }))
        .unwrap();
    let registry = Arc::new(registry);

    let cron = Arc::new(MemoryCron::default());
    let executor = Arc::new(CountingExecutor::default());
    let scheduler =
        BlueprintScheduler::new(repo.clone(), registry.clone(), cron.clone(), executor.clone());
    (BlueprintService::new(repo, registry, scheduler), cron, executor)
}

fn input(name: &str, cron: &str) -> BlueprintInput {
    BlueprintInput {
        name: name.to_string(),
        project_name: Some("demo".to_string()),
        mode: BlueprintMode::Normal,
        plan: PipelinePlan::default(),
        settings: BlueprintSettings {
            connections: vec![BlueprintConnection {
                plugin_name: "gitlab".to_string(),
                connection_id: 3,
                scopes: vec![BlueprintScope {
                    scope_id: "42".to_string(),
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
        labels: vec!["team-a".to_string()],
    }
}

#[tokio::test]
async fn test_mutations_reload_schedule() {
    let (service, cron, _) = service().await;

    let blueprint = service.create(input("nightly", "0 2 * * *")).await.unwrap();
    assert_eq!(cron.registered().await, vec![blueprint.id]);

    service
        .update(blueprint.id, input("nightly", "Manual"))
        .await
        .unwrap();
    assert!(cron.registered().await.is_empty());
    assert!(service.get(blueprint.id).await.unwrap().is_manual);

    service
        .update(blueprint.id, input("nightly", "*/10 * * * *"))
        .await
        .unwrap();
    assert_eq!(cron.registered().await, vec![blueprint.id]);

    service.delete(blueprint.id).await.unwrap();
    assert!(cron.registered().await.is_empty());
    assert!(matches!(
        service.get(blueprint.id).await,
        Err(BlueprintServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_invalid_input_is_not_stored() {
    let (service, _, _) = service().await;

    let err = service.create(input("", "0 2 * * *")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadInput);

    let err = service.create(input("bad cron", "at noon")).await.unwrap_err();
    assert!(matches!(
        err,
        BlueprintServiceError::Scheduler(SchedulerError::InvalidCron { .. })
    ));

    let mut unknown = input("unknown", "manual");
    unknown.settings.connections[0].plugin_name = "bitbucket".to_string();
    assert!(matches!(
        service.create(unknown).await,
        Err(BlueprintServiceError::Validation(_))
    ));

    let mut advanced = input("advanced", "manual");
    advanced.mode = BlueprintMode::Advanced;
    assert!(matches!(
        service.create(advanced).await,
        Err(BlueprintServiceError::Validation(_))
    ));

    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_trigger_manual_blueprint() {
    let (service, cron, executor) = service().await;
    let blueprint = service.create(input("adhoc", "manual")).await.unwrap();
    assert!(cron.registered().await.is_empty());

    let record = service
        .trigger(blueprint.id, TriggerOptions::default())
        .await
        .unwrap();
    assert_eq!(record.blueprint_id, Some(blueprint.id));
    assert_eq!(*executor.runs.lock(), vec![Some(blueprint.id)]);
}

#[tokio::test]
async fn test_advanced_plan_round_trips() {
    let (service, _, executor) = service().await;
    let mut advanced = input("advanced", "manual");
    advanced.mode = BlueprintMode::Advanced;
    advanced.plan = PipelinePlan::single(vec![
        PipelineTask::new("gitlab").with_subtasks(vec!["collectMrs".to_string()])
    ]);
    let created = service.create(advanced.clone()).await.unwrap();

    let stored = service.get(created.id).await.unwrap();
    assert_eq!(stored.plan, advanced.plan);
    assert_eq!(stored.labels, vec!["team-a".to_string()]);

    service
        .trigger(created.id, TriggerOptions::default())
        .await
        .unwrap();
    assert_eq!(executor.runs.lock().len(), 1);
}

#[tokio::test]
async fn test_missing_blueprint() {
    let (service, _, _) = service().await;
    assert!(matches!(
        service.update(7, input("x", "manual")).await,
        Err(BlueprintServiceError::NotFound(7))
    ));
    assert!(matches!(
        service.delete(7).await,
        Err(BlueprintServiceError::NotFound(7))
    ));
    assert!(matches!(
        service.trigger(7, TriggerOptions::default()).await,
        Err(BlueprintServiceError::NotFound(7))
    ));
}
