// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use croner::Cron;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::models::blueprint::{is_manual_cron, TriggerOptions};
use crate::domain::models::pipeline::PipelineRecord;
use crate::domain::plugin::PluginRegistry;
use crate::domain::repositories::blueprint_repository::BlueprintRepository;
use crate::domain::services::plan_builder::{make_blueprint_plan, PlanError};
use crate::utils::errors::{Classify, ErrorKind, PipelineError, RepositoryError};
use crate::workers::pipeline_runner::PipelineExecutor;

/// 调度器错误类型
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// cron 表达式无效
    #[error("Invalid cron expression {expr:?}: {message}")]
    InvalidCron { expr: String, message: String },
    /// 蓝图不存在
    #[error("Blueprint {0} not found")]
    BlueprintNotFound(i64),
    /// cron 注册失败
    #[error("Cron registry error: {0}")]
    Registry(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl Classify for SchedulerError {
    fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::InvalidCron { .. } => ErrorKind::BadInput,
            SchedulerError::BlueprintNotFound(_) => ErrorKind::NotFound,
            SchedulerError::Registry(_) => ErrorKind::Internal,
            SchedulerError::Repository(e) => e.kind(),
            SchedulerError::Plan(e) => e.kind(),
            SchedulerError::Pipeline(e) => e.kind(),
        }
    }
}

/// cron 触发时执行的任务
pub type CronJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// cron 注册表
///
/// 生产环境由 tokio-cron-scheduler 实现，测试中使用内存实现
#[async_trait]
pub trait CronRegistry: Send + Sync {
    /// 为蓝图注册一个 cron 任务
    async fn register(&self, blueprint_id: i64, cron: &str, job: CronJob)
        -> Result<(), SchedulerError>;
    /// 移除所有已注册任务
    async fn clear(&self) -> Result<(), SchedulerError>;
    /// 已注册的蓝图ID
    async fn registered(&self) -> Vec<i64>;
}

/// 把 5 段 cron 表达式补全为带秒的 6 段形式
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    }
}

/// 校验 cron 表达式，`manual` 总是合法
pub fn validate_cron(expr: &str) -> Result<(), SchedulerError> {
    if is_manual_cron(expr) {
        return Ok(());
    }
    Cron::new(&normalize_cron(expr))
        .with_seconds_optional()
        .parse()
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron {
            expr: expr.to_string(),
            message: e.to_string(),
        })
}

/// 蓝图调度器
///
/// 任何一次蓝图变更后都全量重载：清空 cron 注册表，
/// 再为每个启用且非手动的蓝图重新注册。触发时总是从当前设置重新生成计划。
pub struct BlueprintScheduler {
    repo: Arc<dyn BlueprintRepository>,
    registry: Arc<PluginRegistry>,
    cron: Arc<dyn CronRegistry>,
    executor: Arc<dyn PipelineExecutor>,
    reload_lock: Mutex<()>,
    this: Weak<BlueprintScheduler>,
}

impl BlueprintScheduler {
    pub fn new(
        repo: Arc<dyn BlueprintRepository>,
        registry: Arc<PluginRegistry>,
        cron: Arc<dyn CronRegistry>,
        executor: Arc<dyn PipelineExecutor>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            repo,
            registry,
            cron,
            executor,
            reload_lock: Mutex::new(()),
            this: this.clone(),
        })
    }

    /// 重新注册所有定时蓝图
    ///
    /// # 返回值
    ///
    /// 成功注册的蓝图数；表达式无效的蓝图被跳过并记录警告
    pub async fn reload(&self) -> Result<usize, SchedulerError> {
        let _guard = self.reload_lock.lock().await;
        self.cron.clear().await?;

        let mut registered = 0;
        for blueprint in self.repo.list_scheduled().await? {
            if !blueprint.is_scheduled() {
                continue;
            }
            if let Err(e) = validate_cron(&blueprint.cron_config) {
                warn!("Skipping blueprint {}: {}", blueprint.id, e);
                continue;
            }

            let id = blueprint.id;
            let this = self.this.clone();
            let job: CronJob = Arc::new(move || {
                let this = this.clone();
                async move {
                    if let Some(scheduler) = this.upgrade() {
                        scheduler.run_scheduled(id).await;
                    }
                }
                .boxed()
            });
            self.cron
                .register(id, &normalize_cron(&blueprint.cron_config), job)
                .await?;
            registered += 1;
        }

        info!("Blueprint schedule reloaded: {} job(s)", registered);
        Ok(registered)
    }

    /// 立即触发蓝图
    ///
    /// 手动蓝图只能通过这里执行
    pub async fn fire(
        &self,
        blueprint_id: i64,
        options: TriggerOptions,
    ) -> Result<PipelineRecord, SchedulerError> {
        let blueprint = self
            .repo
            .find_by_id(blueprint_id)
            .await?
            .ok_or(SchedulerError::BlueprintNotFound(blueprint_id))?;

        let plan = make_blueprint_plan(&self.registry, &blueprint, options)?;
        info!(
            "Firing blueprint {} ({}) with {} stage(s)",
            blueprint.id,
            blueprint.name,
            plan.len()
        );
        let record = self
            .executor
            .submit(Some(blueprint.id), plan, blueprint.skip_on_fail)
            .await?;
        Ok(record)
    }

    async fn run_scheduled(&self, blueprint_id: i64) {
        match self.fire(blueprint_id, TriggerOptions::default()).await {
            Ok(record) => info!(
                "Scheduled pipeline {} for blueprint {} finished: {}",
                record.id, blueprint_id, record.status
            ),
            Err(SchedulerError::Plan(PlanError::EmptyPlan)) => {
                info!("Blueprint {} produced an empty plan, skipped", blueprint_id)
            }
            Err(e) if e.kind() == ErrorKind::Cancelled => {
                info!("Scheduled run of blueprint {} cancelled", blueprint_id)
            }
            Err(e) => error!("Scheduled run of blueprint {} failed: {}", blueprint_id, e),
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
