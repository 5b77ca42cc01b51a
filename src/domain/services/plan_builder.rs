// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::{BTreeSet, HashMap};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::domain::models::blueprint::{
    Blueprint, BlueprintMode, BlueprintSettings, SyncPolicy, TriggerOptions,
};
use crate::domain::models::pipeline_plan::{PipelinePlan, PipelineStage, PipelineTask};
use crate::domain::models::subtask::SubTaskMeta;
use crate::domain::plugin::PluginRegistry;
use crate::utils::errors::{Classify, ErrorKind};

/// 计划构建错误类型
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    /// 依赖了不存在的子任务
    #[error("Subtask {subtask} depends on unknown subtask {dependency}")]
    UnknownDependency { subtask: String, dependency: String },
    /// 子任务重名
    #[error("Duplicate subtask: {0}")]
    DuplicateSubtask(String),
    /// 依赖成环
    #[error("Dependency cycle among subtasks: {0}")]
    Cycle(String),
    /// 插件未注册
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),
    /// 计划中没有实质性任务
    #[error("Plan contains no substantive task")]
    EmptyPlan,
}

impl Classify for PlanError {
    fn kind(&self) -> ErrorKind {
        match self {
            PlanError::PluginNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::BadInput,
        }
    }
}

/// 子任务是否被请求的领域类型选中
fn is_selected(meta: &SubTaskMeta, entities: &[String]) -> bool {
    meta.required
        || entities.is_empty()
        || meta.domain_types.iter().any(|t| entities.contains(t))
}

/// 对全部子任务做拓扑排序，同层按声明顺序
///
/// # 返回值
///
/// * `Ok(Vec<usize>)` - 子任务在 `metas` 中的下标，依赖在前
/// * `Err(PlanError)` - 重名、未知依赖或依赖成环
pub fn sort_subtasks(metas: &[SubTaskMeta]) -> Result<Vec<usize>, PlanError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(metas.len());
    for (i, meta) in metas.iter().enumerate() {
        if index.insert(meta.name.as_str(), i).is_some() {
            return Err(PlanError::DuplicateSubtask(meta.name.clone()));
        }
    }

    let mut in_degree = vec![0usize; metas.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); metas.len()];
    for (i, meta) in metas.iter().enumerate() {
        for dep in &meta.dependencies {
            let &d = index
                .get(dep.as_str())
                .ok_or_else(|| PlanError::UnknownDependency {
                    subtask: meta.name.clone(),
                    dependency: dep.clone(),
                })?;
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..metas.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(metas.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != metas.len() {
        let stuck: Vec<&str> = (0..metas.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| metas[i].name.as_str())
            .collect();
        return Err(PlanError::Cycle(stuck.join(", ")));
    }
    Ok(order)
}

/// 为一个数据范围选择并排序子任务
///
/// 子任务被选中当且仅当它是必选的，或其领域类型与请求的类型有交集；
/// 请求集合为空表示全部领域类型
pub fn make_pipeline_plan_subtasks(
    metas: &[SubTaskMeta],
    entities: &[String],
) -> Result<Vec<String>, PlanError> {
    let order = sort_subtasks(metas)?;
    Ok(order
        .into_iter()
        .map(|i| &metas[i])
        .filter(|meta| is_selected(meta, entities))
        .map(|meta| meta.name.clone())
        .collect())
}

/// 顺序拼接多个计划
pub fn sequencialize_pipeline_plans(plans: Vec<PipelinePlan>) -> PipelinePlan {
    PipelinePlan::new(plans.into_iter().flat_map(|plan| plan.0).collect())
}

/// 按阶段合并多个计划，同一阶段内的任务取并集
pub fn parallelize_pipeline_plans(plans: Vec<PipelinePlan>) -> PipelinePlan {
    let depth = plans.iter().map(PipelinePlan::len).max().unwrap_or(0);
    let mut stages: Vec<PipelineStage> = vec![Vec::new(); depth];
    for plan in plans {
        for (i, stage) in plan.0.into_iter().enumerate() {
            for task in stage {
                if !stages[i].contains(&task) {
                    stages[i].push(task);
                }
            }
        }
    }
    PipelinePlan::new(stages)
}

/// 计划是否只包含卫星插件
fn is_effectively_empty(plan: &PipelinePlan, registry: &PluginRegistry) -> bool {
    plan.tasks().all(|task| registry.is_satellite(&task.plugin))
}

/// 由蓝图设置生成完整计划
///
/// 每个连接的每个范围在第一阶段生成一个任务，插件声明的伴随任务进入下一阶段；
/// 各范围的计划并行合并，前后再拼接 `before_plan` 与 `after_plan`，
/// 有项目时最后为每个指标插件追加一个阶段
///
/// # 参数
///
/// * `registry` - 插件注册表
/// * `settings` - 蓝图设置
/// * `policy` - 同步策略
/// * `project_name` - 所属项目
///
/// # 返回值
///
/// * `Ok(PipelinePlan)` - 生成的计划
/// * `Err(PlanError::EmptyPlan)` - 计划只包含卫星插件
pub fn make_plan(
    registry: &PluginRegistry,
    settings: &BlueprintSettings,
    policy: &SyncPolicy,
    project_name: Option<&str>,
) -> Result<PipelinePlan, PlanError> {
    let time_after = policy.time_after.or(settings.time_after);
    let mut scope_plans = Vec::new();

    for connection in &settings.connections {
        let plugin = registry
            .get(&connection.plugin_name)
            .ok_or_else(|| PlanError::PluginNotFound(connection.plugin_name.clone()))?;

        for scope in &connection.scopes {
            let subtasks = make_pipeline_plan_subtasks(plugin.subtask_metas(), &scope.entities)?;
            let mut task = PipelineTask::new(plugin.name()).with_subtasks(subtasks);
            task.options = scope.options.clone();
            task.options
                .insert("connectionId".to_string(), json!(connection.connection_id));
            task.options
                .insert("scopeId".to_string(), Value::String(scope.scope_id.clone()));
            if let Some(time_after) = time_after {
                task.options
                    .insert("timeAfter".to_string(), Value::String(time_after.to_rfc3339()));
            }
            if policy.full_sync {
                task.options.insert("fullSync".to_string(), Value::Bool(true));
            }

            let mut plan = PipelinePlan::single(vec![task]);
            let follow_ups = plugin.follow_up_tasks(connection, scope, policy);
            if !follow_ups.is_empty() {
                plan.push_stage(follow_ups);
            }
            scope_plans.push(plan);
        }
    }

    let mut parts = Vec::with_capacity(3);
    if let Some(before) = &settings.before_plan {
        parts.push(before.clone());
    }
    parts.push(parallelize_pipeline_plans(scope_plans));
    if let Some(after) = &settings.after_plan {
        parts.push(after.clone());
    }
    let mut plan = sequencialize_pipeline_plans(parts);

    if is_effectively_empty(&plan, registry) {
        return Err(PlanError::EmptyPlan);
    }

    if let Some(project) = project_name.filter(|p| !p.is_empty()) {
        for metric in registry.metric_plugins() {
            plan.push_stage(vec![PipelineTask::new(metric.name())
                .with_option("projectName", Value::String(project.to_string()))]);
        }
    }

    debug!(
        "Built plan with {} stage(s), {} task(s)",
        plan.len(),
        plan.task_count()
    );
    Ok(plan)
}

/// 为蓝图生成本次执行的计划
///
/// 高级模式直接使用保存的计划，普通模式每次都从当前设置重新生成
pub fn make_blueprint_plan(
    registry: &PluginRegistry,
    blueprint: &Blueprint,
    trigger: TriggerOptions,
) -> Result<PipelinePlan, PlanError> {
    let mut plan = match blueprint.mode {
        BlueprintMode::Advanced => {
            if is_effectively_empty(&blueprint.plan, registry) {
                return Err(PlanError::EmptyPlan);
            }
            blueprint.plan.clone()
        }
        BlueprintMode::Normal => {
            let policy = SyncPolicy {
                time_after: blueprint.settings.time_after,
                full_sync: trigger.full_sync,
                skip_on_fail: blueprint.skip_on_fail,
            };
            make_plan(
                registry,
                &blueprint.settings,
                &policy,
                blueprint.project_name.as_deref(),
            )?
        }
    };

    for task in plan.0.iter_mut().flatten() {
        if trigger.full_sync {
            task.options.insert("fullSync".to_string(), Value::Bool(true));
        }
        if trigger.skip_collectors {
            task.options
                .insert("skipCollectors".to_string(), Value::Bool(true));
        }
    }
    Ok(plan)
}

#[cfg(test)]
#[path = "plan_builder_test.rs"]
mod tests;
