// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::models::pipeline::{PipelineRecord, PipelineStatus, TaskRecord};
use crate::domain::models::pipeline_plan::{PipelinePlan, PipelineTask};
use crate::domain::models::subtask::{SubTaskContext, SubTaskMeta};
use crate::domain::plugin::PluginRegistry;
use crate::domain::services::plan_builder::sort_subtasks;
use crate::utils::errors::{Classify, ErrorKind, PipelineError};

/// 流水线执行特质
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    /// 执行计划直至结束，任务失败记录在返回的记录中
    async fn submit(
        &self,
        blueprint_id: Option<i64>,
        plan: PipelinePlan,
        skip_on_fail: bool,
    ) -> Result<PipelineRecord, PipelineError>;
}

/// 流水线执行器
///
/// 按阶段顺序执行计划：阶段是屏障，阶段内任务并发执行，
/// 每个任务按依赖顺序运行其子任务
pub struct PipelineRunner {
    registry: Arc<PluginRegistry>,
    cancel: CancellationToken,
}

impl PipelineRunner {
    /// 创建新的流水线执行器
    ///
    /// # 参数
    ///
    /// * `registry` - 插件注册表
    /// * `cancel` - 进程级取消令牌，每条流水线使用其子令牌
    pub fn new(registry: Arc<PluginRegistry>, cancel: CancellationToken) -> Self {
        Self { registry, cancel }
    }

    /// 执行一条流水线
    pub async fn run(&self, mut record: PipelineRecord, skip_on_fail: bool) -> PipelineRecord {
        let cancel = self.cancel.child_token();
        record.status = PipelineStatus::Running;
        info!(
            "Pipeline {} started: {} stage(s)",
            record.id,
            record.plan.len()
        );

        let stages = record.plan.stages().to_vec();
        let mut failed = false;
        let mut cancelled = false;

        for (stage_index, stage) in stages.into_iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut tasks = JoinSet::new();
            for (task_index, task) in stage.into_iter().enumerate() {
                let registry = self.registry.clone();
                let cancel = cancel.clone();
                tasks.spawn(async move {
                    let plugin = task.plugin.clone();
                    let result = run_task(&registry, task, cancel).await;
                    (task_index, plugin, result)
                });
            }

            let mut results = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => results.push((
                        usize::MAX,
                        "unknown".to_string(),
                        Err(PipelineError::Internal(e.to_string())),
                    )),
                }
            }
            results.sort_by_key(|(index, _, _)| *index);

            for (_, plugin, result) in results {
                let task_record = match result {
                    Ok(()) => TaskRecord {
                        plugin,
                        stage: stage_index,
                        status: PipelineStatus::Completed,
                        error: None,
                        error_kind: None,
                    },
                    Err(e) => {
                        let kind = e.kind();
                        if kind == ErrorKind::Cancelled {
                            info!("Task {} in stage {} cancelled", plugin, stage_index);
                            cancelled = true;
                        } else {
                            error!("Task {} in stage {} failed: {}", plugin, stage_index, e);
                            failed = true;
                            if record.error.is_none() {
                                record.error = Some(e.to_string());
                                record.error_kind = Some(kind);
                            }
                        }
                        TaskRecord {
                            plugin,
                            stage: stage_index,
                            status: if kind == ErrorKind::Cancelled {
                                PipelineStatus::Cancelled
                            } else {
                                PipelineStatus::Failed
                            },
                            error: Some(e.to_string()),
                            error_kind: Some(kind),
                        }
                    }
                };
                record.tasks.push(task_record);
            }

            if cancelled || (failed && !skip_on_fail) {
                break;
            }
            if failed {
                warn!(
                    "Pipeline {} stage {} had failures, continuing",
                    record.id, stage_index
                );
            }
        }

        record.status = if cancelled {
            PipelineStatus::Cancelled
        } else if failed && skip_on_fail {
            PipelineStatus::PartialSuccess
        } else if failed {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Completed
        };
        record.finished_at = Some(Utc::now());
        counter!("pipelines_total", "status" => record.status.to_string()).increment(1);
        info!("Pipeline {} finished: {}", record.id, record.status);
        record
    }
}

#[async_trait]
impl PipelineExecutor for PipelineRunner {
    async fn submit(
        &self,
        blueprint_id: Option<i64>,
        plan: PipelinePlan,
        skip_on_fail: bool,
    ) -> Result<PipelineRecord, PipelineError> {
        let record = PipelineRecord::new(blueprint_id, plan);
        Ok(self.run(record, skip_on_fail).await)
    }
}

/// 子任务是否为采集子任务
fn is_collector(meta: &SubTaskMeta) -> bool {
    meta.name.to_ascii_lowercase().contains("collect")
}

/// 选出任务要执行的子任务
///
/// 计划未列出子任务时执行所有默认启用及必选的子任务
fn select_subtasks<'a>(
    plugin: &str,
    metas: &'a [SubTaskMeta],
    task: &PipelineTask,
) -> Result<Vec<&'a SubTaskMeta>, PipelineError> {
    let order = sort_subtasks(metas)?;
    let skip_collectors = task
        .options
        .get("skipCollectors")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let wanted: Option<HashSet<&str>> = if task.subtasks.is_empty() {
        None
    } else {
        for name in &task.subtasks {
            if !metas.iter().any(|m| &m.name == name) {
                return Err(PipelineError::SubTaskNotFound {
                    plugin: plugin.to_string(),
                    subtask: name.clone(),
                });
            }
        }
        Some(task.subtasks.iter().map(String::as_str).collect())
    };

    Ok(order
        .into_iter()
        .map(|i| &metas[i])
        .filter(|meta| match &wanted {
            Some(names) => names.contains(meta.name.as_str()),
            None => meta.enabled_by_default || meta.required,
        })
        .filter(|meta| !(skip_collectors && is_collector(meta)))
        .collect())
}

/// 执行一个流水线任务
async fn run_task(
    registry: &PluginRegistry,
    task: PipelineTask,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let plugin = registry
        .get(&task.plugin)
        .ok_or_else(|| PipelineError::PluginNotFound(task.plugin.clone()))?;

    let subtasks = select_subtasks(plugin.name(), plugin.subtask_metas(), &task)?;
    let task_data = plugin.prepare_task_data(&task.options).await?;
    let options = Arc::new(task.options);

    for meta in subtasks {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        info!("Executing subtask {}.{}", plugin.name(), meta.name);
        let ctx = SubTaskContext::new(plugin.name(), &meta.name, options.clone(), cancel.clone())
            .with_task_data(task_data.clone());
        (meta.entry_point)(ctx).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "pipeline_runner_test.rs"]
mod tests;
