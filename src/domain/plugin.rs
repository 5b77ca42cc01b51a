// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::models::blueprint::{BlueprintConnection, BlueprintScope, SyncPolicy};
use crate::domain::models::pipeline_plan::PipelineTask;
use crate::domain::models::subtask::{SubTaskInfo, SubTaskMeta};
use crate::utils::errors::PipelineError;

/// 插件特质
///
/// 一个数据源连接器或跨数据源的处理器。插件声明自己的子任务，
/// 计划构建器据此选择子任务，流水线执行器据此运行子任务。
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 插件名称，同时是计划中 `plugin` 字段的取值
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// 插件模型所在的模块路径前缀，用于生成领域ID
    fn module_path(&self) -> &str;

    /// 子任务声明，按声明顺序
    fn subtask_metas(&self) -> &[SubTaskMeta];

    /// 卫星插件只做横切增强，单独出现时计划视为空
    fn is_satellite(&self) -> bool {
        false
    }

    /// 指标插件在计划末尾以独立阶段追加
    fn is_metric(&self) -> bool {
        false
    }

    /// 在该范围任务之后的阶段中执行的伴随任务
    fn follow_up_tasks(
        &self,
        _connection: &BlueprintConnection,
        _scope: &BlueprintScope,
        _policy: &SyncPolicy,
    ) -> Vec<PipelineTask> {
        Vec::new()
    }

    /// 执行子任务前准备共享的任务数据
    async fn prepare_task_data(
        &self,
        _options: &Map<String, Value>,
    ) -> Result<Option<Arc<dyn Any + Send + Sync>>, PipelineError> {
        Ok(None)
    }
}

/// 插件注册表
///
/// 显式构造并传递，不使用全局单例
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    by_name: HashMap<String, usize>,
    modules: Vec<(String, String)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件及其模块路径
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PipelineError> {
        let name = plugin.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(PipelineError::Internal(format!(
                "plugin {} is already registered",
                name
            )));
        }
        let module = plugin.module_path().to_string();
        if !module.is_empty() {
            self.register_module(module, name.clone());
        }
        debug!("Registered plugin {}", name);
        self.by_name.insert(name, self.plugins.len());
        self.plugins.push(plugin);
        Ok(())
    }

    /// 额外登记一个属于某插件的模块路径
    pub fn register_module(&mut self, module_prefix: impl Into<String>, plugin: impl Into<String>) {
        self.modules.push((module_prefix.into(), plugin.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.by_name.get(name).map(|&i| &self.plugins[i])
    }

    /// 按注册顺序返回所有插件
    pub fn plugins(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    /// 指标插件
    pub fn metric_plugins(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter().filter(|p| p.is_metric())
    }

    /// 未注册的插件按非卫星处理
    pub fn is_satellite(&self, name: &str) -> bool {
        self.get(name).is_some_and(|p| p.is_satellite())
    }

    /// 按最长模块前缀查找类型所属插件
    pub fn plugin_for_module(&self, path: &str) -> Option<&str> {
        self.modules
            .iter()
            .filter(|(prefix, _)| {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with("::"))
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, plugin)| plugin.as_str())
    }

    /// 插件的子任务信息
    pub fn subtask_infos(&self, plugin: &str) -> Result<Vec<SubTaskInfo>, PipelineError> {
        let plugin = self
            .get(plugin)
            .ok_or_else(|| PipelineError::PluginNotFound(plugin.to_string()))?;
        Ok(plugin.subtask_metas().iter().map(SubTaskMeta::info).collect())
    }
}
