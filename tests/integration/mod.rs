// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 端到端：蓝图触发 → 采集 → 原始表 → 抽取 → 工具表 → 转换 → 领域表

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, Query},
    routing::get,
    Json, Router,
};
use futures::stream::{self, StreamExt};
use ingestrs::collector::api_client::{ApiClient, ApiClientOptions};
use ingestrs::collector::api_collector::parsers;
use ingestrs::collector::traits::{CollectorError, PageContext};
use ingestrs::collector::{
    ApiCollector, ApiCollectorArgs, ApiExtractor, ApiExtractorArgs, DataConverter,
    DataConverterArgs,
};
use ingestrs::config::settings::{BatchSettings, CollectorSettings};
use ingestrs::domain::models::blueprint::{
    BlueprintConnection, BlueprintInput, BlueprintMode, BlueprintScope, BlueprintSettings,
    TriggerOptions,
};
use ingestrs::domain::models::pipeline::PipelineStatus;
use ingestrs::domain::models::pipeline_plan::PipelinePlan;
use ingestrs::domain::models::raw_data::{HasRawOrigin, RawDataArgs, RawDataOrigin};
use ingestrs::domain::models::subtask::{SubTaskContext, SubTaskMeta};
use ingestrs::domain::plugin::{Plugin, PluginRegistry};
use ingestrs::domain::repositories::raw_data_repository::RawDataRepository;
use ingestrs::domain::services::batch_save_divider::{boxed, Persistable};
use ingestrs::domain::services::blueprint_service::BlueprintService;
use ingestrs::domain::services::domain_id::{DomainIdGenerator, IdKey};
use ingestrs::infrastructure::cron::TokioCronRegistry;
use ingestrs::infrastructure::repositories::blueprint_repo_impl::BlueprintRepoImpl;
use ingestrs::infrastructure::repositories::bulk_writer_impl::BulkWriterImpl;
use ingestrs::infrastructure::repositories::raw_data_repo_impl::RawDataRepoImpl;
use ingestrs::queue::scheduler::BlueprintScheduler;
use ingestrs::utils::errors::PipelineError;
use ingestrs::workers::PipelineRunner;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

mod demo {
    pub mod models {
        use ingestrs::domain::models::raw_data::RawDataOrigin;

        /// 工具层问题
        #[derive(Debug, Clone, Default)]
        pub struct DemoIssue {
            pub connection_id: i64,
            pub id: i64,
            pub title: String,
            pub origin: RawDataOrigin,
        }
    }
}

use demo::models::DemoIssue;

impl HasRawOrigin for DemoIssue {
    fn raw_origin(&self) -> &RawDataOrigin {
        &self.origin
    }
    fn set_raw_origin(&mut self, origin: RawDataOrigin) {
        self.origin = origin;
    }
}

impl Persistable for DemoIssue {
    fn table_name() -> &'static str {
        "_tool_demo_issues"
    }
    fn primary_keys() -> &'static [&'static str] {
        &["connection_id", "id"]
    }
    fn columns() -> &'static [&'static str] {
        &["connection_id", "id", "title"]
    }
    fn values(&self) -> Vec<sea_orm::Value> {
        vec![self.connection_id.into(), self.id.into(), self.title.clone().into()]
    }
}

/// 领域层问题
#[derive(Debug, Clone, Default)]
struct Issue {
    id: String,
    title: String,
    origin: RawDataOrigin,
}

impl HasRawOrigin for Issue {
    fn raw_origin(&self) -> &RawDataOrigin {
        &self.origin
    }
    fn set_raw_origin(&mut self, origin: RawDataOrigin) {
        self.origin = origin;
    }
}

impl Persistable for Issue {
    fn table_name() -> &'static str {
        "issues"
    }
    fn primary_keys() -> &'static [&'static str] {
        &["id"]
    }
    fn columns() -> &'static [&'static str] {
        &["id", "title"]
    }
    fn values(&self) -> Vec<sea_orm::Value> {
        vec![self.id.clone().into(), self.title.clone().into()]
    }
}

const RAW_TABLE: &str = "demo_api_issues";

/// 子任务共享的任务数据
struct DemoTaskData {
    client: Arc<ApiClient>,
    raw: Arc<RawDataRepoImpl>,
    writer: Arc<BulkWriterImpl>,
    db: Arc<DatabaseConnection>,
    collector: CollectorSettings,
    batch: BatchSettings,
    ids: DomainIdGenerator,
    connection_id: u64,
    project: String,
}

impl DemoTaskData {
    fn raw_args(&self) -> RawDataArgs {
        RawDataArgs::new(
            RAW_TABLE,
            json!({"ConnectionId": self.connection_id, "Project": self.project}),
        )
    }
}

struct DemoPlugin {
    endpoint: String,
    db: Arc<DatabaseConnection>,
    collector: CollectorSettings,
    batch: BatchSettings,
    registry_for_ids: PluginRegistry,
    metas: Vec<SubTaskMeta>,
}

impl DemoPlugin {
    fn new(endpoint: String, db: Arc<DatabaseConnection>) -> Self {
        let mut registry_for_ids = PluginRegistry::new();
        registry_for_ids.register_module(concat!(module_path!(), "::demo"), "demo");
        Self {
            endpoint,
            db,
            collector: CollectorSettings {
                concurrency: 2,
                page_size: 2,
                requests_per_minute: 0,
                timeout_seconds: 10,
                max_retries: 0,
                empty_page_probe: 1,
            },
            batch: BatchSettings { size: 2 },
            registry_for_ids,
            metas: vec![
                SubTaskMeta::new("collectIssues", collect_issues)
                    .domain_types(&["TICKET"])
                    .description("collect issues into the raw table"),
                SubTaskMeta::new("extractIssues", extract_issues)
                    .domain_types(&["TICKET"])
                    .depends_on(&["collectIssues"]),
                SubTaskMeta::new("convertIssues", convert_issues)
                    .domain_types(&["TICKET"])
                    .depends_on(&["extractIssues"]),
            ],
        }
    }
}

#[async_trait]
impl Plugin for DemoPlugin {
    fn name(&self) -> &str {
        "demo"
    }

    fn module_path(&self) -> &str {
        concat!(module_path!(), "::demo")
    }

    fn subtask_metas(&self) -> &[SubTaskMeta] {
        &self.metas
    }

    async fn prepare_task_data(
        &self,
        options: &Map<String, Value>,
    ) -> Result<Option<Arc<dyn Any + Send + Sync>>, PipelineError> {
        let connection_id = options
            .get("connectionId")
            .and_then(Value::as_u64)
            .ok_or_else(|| PipelineError::BadOptions("connectionId is required".to_string()))?;
        let project = options
            .get("scopeId")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::BadOptions("scopeId is required".to_string()))?
            .to_string();

        let client = ApiClient::new(&self.endpoint, ApiClientOptions::from_settings(&self.collector))?;
        Ok(Some(Arc::new(DemoTaskData {
            client: Arc::new(client),
            raw: Arc::new(RawDataRepoImpl::new(self.db.clone())),
            writer: Arc::new(BulkWriterImpl::new(self.db.clone())),
            db: self.db.clone(),
            collector: self.collector.clone(),
            batch: self.batch.clone(),
            ids: DomainIdGenerator::for_model::<DemoIssue>(&self.registry_for_ids)?,
            connection_id,
            project,
        })))
    }
}

fn page_query(ctx: &PageContext) -> Result<Vec<(String, String)>, CollectorError> {
    Ok(vec![
        ("page".to_string(), ctx.pager.page.to_string()),
        ("per_page".to_string(), ctx.pager.size.to_string()),
    ])
}

async fn collect_issues(ctx: SubTaskContext) -> Result<(), PipelineError> {
    let data = ctx.task_data::<DemoTaskData>()?;
    let args = ApiCollectorArgs::new(
        data.raw_args(),
        data.client.clone(),
        format!("projects/{}/issues", data.project),
        parsers::json_array(),
    )
    .with_settings(&data.collector)
    .incremental(!ctx.full_sync())
    .query(page_query);

    ApiCollector::new(args, data.raw.clone())?
        .execute(&ctx.cancel, ctx.progress.clone())
        .await?;
    Ok(())
}

async fn extract_issues(ctx: SubTaskContext) -> Result<(), PipelineError> {
    let data = ctx.task_data::<DemoTaskData>()?;
    let connection_id = data.connection_id as i64;
    let args = ApiExtractorArgs::new(data.raw_args(), move |row| {
        let body = row.data_json()?;
        Ok(vec![boxed(DemoIssue {
            connection_id,
            id: body["id"].as_i64().unwrap_or_default(),
            title: body["title"].as_str().unwrap_or_default().to_string(),
            ..Default::default()
        })])
    })
    .with_settings(&data.batch);

    ApiExtractor::new(args, data.raw.clone(), data.writer.clone())?
        .execute(&ctx.cancel, ctx.progress.clone())
        .await?;
    Ok(())
}

async fn convert_issues(ctx: SubTaskContext) -> Result<(), PipelineError> {
    let data = ctx.task_data::<DemoTaskData>()?;
    let raw_args = data.raw_args();
    let db = data.db.clone();
    let rows = db
        .query_all(Statement::from_sql_and_values(
            db.get_database_backend(),
            "SELECT connection_id, id, title, _raw_data_table, _raw_data_params, \
             _raw_data_id, _raw_data_remark FROM _tool_demo_issues \
             WHERE _raw_data_params = ? ORDER BY id",
            [raw_args.params_string().into()],
        ))
        .await
        .map_err(|e| PipelineError::Internal(e.to_string()))?;

    let tool_rows: Vec<Result<DemoIssue, CollectorError>> = rows
        .iter()
        .map(|r| {
            let read = |e: sea_orm::DbErr| CollectorError::Convert(e.to_string());
            Ok(DemoIssue {
                connection_id: r.try_get("", "connection_id").map_err(read)?,
                id: r.try_get("", "id").map_err(read)?,
                title: r.try_get("", "title").map_err(read)?,
                origin: RawDataOrigin {
                    raw_data_table: r.try_get("", "_raw_data_table").map_err(read)?,
                    raw_data_params: r.try_get("", "_raw_data_params").map_err(read)?,
                    raw_data_id: r.try_get("", "_raw_data_id").map_err(read)?,
                    raw_data_remark: r.try_get("", "_raw_data_remark").map_err(read)?,
                },
            })
        })
        .collect();

    let ids = data.ids.clone();
    let args = DataConverterArgs::new(raw_args, stream::iter(tool_rows).boxed(), move |row: DemoIssue| {
        let id = ids
            .generate(&[IdKey::from(row.connection_id), IdKey::from(row.id)])
            .map_err(|e| CollectorError::Convert(e.to_string()))?;
        Ok(vec![boxed(Issue {
            id,
            title: row.title,
            ..Default::default()
        })])
    })
    .with_settings(&data.batch);

    DataConverter::new(args, data.writer.clone())?
        .execute(&ctx.cancel, ctx.progress.clone())
        .await?;
    Ok(())
}

/// 上游接口：每个项目 5 个问题
async fn start_upstream(hits: Arc<AtomicUsize>) -> String {
    let app = Router::new().route(
        "/projects/{project}/issues",
        get(
            move |Path(project): Path<String>, Query(params): Query<HashMap<String, String>>| {
                hits.fetch_add(1, Ordering::SeqCst);
                let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
                let per_page: usize = params
                    .get("per_page")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(100);
                let items: Vec<Value> = (1..=5)
                    .skip((page - 1) * per_page)
                    .take(per_page)
                    .map(|n| json!({"id": n, "title": format!("{} issue {}", project, n)}))
                    .collect();
                async move { Json(items) }
            },
        ),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

async fn count(db: &DatabaseConnection, sql: &str) -> i64 {
    db.query_one(Statement::from_string(db.get_database_backend(), sql.to_string()))
        .await
        .unwrap()
        .unwrap()
        .try_get_by_index::<i64>(0)
        .unwrap()
}

async fn setup_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let origin = "_raw_data_table TEXT, _raw_data_params TEXT, _raw_data_id INTEGER, _raw_data_remark TEXT";
    for ddl in [
        format!(
            "CREATE TABLE _tool_demo_issues (connection_id INTEGER, id INTEGER, title TEXT, {}, \
             PRIMARY KEY (connection_id, id))",
            origin
        ),
        format!("CREATE TABLE issues (id TEXT PRIMARY KEY, title TEXT, {})", origin),
    ] {
        db.execute(Statement::from_string(db.get_database_backend(), ddl))
            .await
            .unwrap();
    }
    Arc::new(db)
}

fn blueprint_input() -> BlueprintInput {
    BlueprintInput {
        name: "demo project".to_string(),
        project_name: None,
        mode: BlueprintMode::Normal,
        plan: PipelinePlan::default(),
        settings: BlueprintSettings {
            connections: vec![BlueprintConnection {
                plugin_name: "demo".to_string(),
                connection_id: 1,
                scopes: vec![BlueprintScope {
                    scope_id: "lake".to_string(),
                    entities: vec!["TICKET".to_string()],
                    options: Map::new(),
                }],
            }],
            ..Default::default()
        },
        cron_config: "manual".to_string(),
        is_manual: false,
        enable: true,
        skip_on_fail: false,
        labels: Vec::new(),
    }
}

#[tokio::test]
async fn test_blueprint_trigger_runs_collect_extract_convert() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = start_upstream(hits.clone()).await;
    let db = setup_db().await;

    let mut registry = PluginRegistry::new();
    registry
        .register(Arc::new(DemoPlugin::new(endpoint, db.clone())))
        .unwrap();
    let registry = Arc::new(registry);

    let runner = Arc::new(PipelineRunner::new(registry.clone(), CancellationToken::new()));
    let cron = Arc::new(TokioCronRegistry::new().await.unwrap());
    let repo = Arc::new(BlueprintRepoImpl::new(db.clone()));
    let scheduler = BlueprintScheduler::new(repo.clone(), registry.clone(), cron.clone(), runner);
    let service = BlueprintService::new(repo, registry, scheduler);

    let blueprint = service.create(blueprint_input()).await.unwrap();
    assert!(blueprint.is_manual);

    let record = service
        .trigger(blueprint.id, TriggerOptions::default())
        .await
        .unwrap();
    assert_eq!(record.status, PipelineStatus::Completed, "{:?}", record.error);
    // pages of 2, 2, 1 and a final empty probe
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    assert_eq!(count(&db, "SELECT COUNT(*) FROM _raw_demo_api_issues").await, 5);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM _tool_demo_issues").await, 5);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM issues").await, 5);
    assert_eq!(
        count(
            &db,
            "SELECT COUNT(*) FROM issues WHERE id = 'demo:DemoIssue:1:3' AND title = 'lake issue 3'"
        )
        .await,
        1
    );

    // a full sync recollects from scratch instead of appending
    let record = service
        .trigger(
            blueprint.id,
            TriggerOptions {
                full_sync: true,
                skip_collectors: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(record.status, PipelineStatus::Completed);
    assert_eq!(hits.load(Ordering::SeqCst), 8);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM _raw_demo_api_issues").await, 5);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM issues").await, 5);

    // skipping collectors reprocesses what is already stored
    let record = service
        .trigger(
            blueprint.id,
            TriggerOptions {
                full_sync: false,
                skip_collectors: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(record.status, PipelineStatus::Completed);
    assert_eq!(hits.load(Ordering::SeqCst), 8);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM issues").await, 5);

    let raw = RawDataRepoImpl::new(db.clone());
    let params = RawDataArgs::new(RAW_TABLE, json!({"ConnectionId": 1, "Project": "lake"})).params_string();
    assert_eq!(
        raw.count_by_params("_raw_demo_api_issues", &params).await.unwrap(),
        5
    );
    cron.shutdown().await.unwrap();
}
