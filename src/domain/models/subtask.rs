// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::utils::errors::PipelineError;

/// 子任务入口函数
pub type SubTaskEntryPoint =
    Arc<dyn Fn(SubTaskContext) -> BoxFuture<'static, Result<(), PipelineError>> + Send + Sync>;

/// 子任务元数据
///
/// 插件声明的一个可执行步骤。`dependencies` 按名称引用同一插件内的其他子任务，
/// 依赖关系必须无环。
#[derive(Clone)]
pub struct SubTaskMeta {
    pub name: String,
    pub entry_point: SubTaskEntryPoint,
    /// 必选子任务总是被纳入计划
    pub required: bool,
    /// 计划未显式列出子任务时是否执行
    pub enabled_by_default: bool,
    pub description: String,
    /// 该子任务产出的领域类型，例如 `TICKET`、`CODE`
    pub domain_types: Vec<String>,
    pub dependencies: Vec<String>,
}

impl SubTaskMeta {
    /// 创建子任务元数据，默认启用、非必选
    pub fn new<F, Fut>(name: impl Into<String>, entry: F) -> Self
    where
        F: Fn(SubTaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            entry_point: Arc::new(move |ctx| entry(ctx).boxed()),
            required: false,
            enabled_by_default: true,
            description: String::new(),
            domain_types: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn domain_types(mut self, types: &[&str]) -> Self {
        self.domain_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.dependencies = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// 对外展示的子任务信息
    pub fn info(&self) -> SubTaskInfo {
        SubTaskInfo {
            name: self.name.clone(),
            required: self.required,
            enabled_by_default: self.enabled_by_default,
            description: self.description.clone(),
            domain_types: self.domain_types.clone(),
        }
    }
}

impl fmt::Debug for SubTaskMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubTaskMeta")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("enabled_by_default", &self.enabled_by_default)
            .field("domain_types", &self.domain_types)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// 子任务信息视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTaskInfo {
    pub name: String,
    pub required: bool,
    pub enabled_by_default: bool,
    pub description: String,
    pub domain_types: Vec<String>,
}

/// 子任务进度
///
/// `total` 为 -1 表示总数未知
#[derive(Debug)]
pub struct Progress {
    current: AtomicI64,
    total: AtomicI64,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            current: AtomicI64::new(0),
            total: AtomicI64::new(-1),
        }
    }
}

impl Progress {
    pub fn set(&self, current: i64, total: i64) {
        self.current.store(current, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn inc(&self, n: i64) {
        self.current.fetch_add(n, Ordering::Relaxed);
    }

    /// 累加总数；总数未知（-1）时直接置为 `n`
    pub fn add_total(&self, n: i64) {
        let _ = self
            .total
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
                Some(if total < 0 { n } else { total + n })
            });
    }

    /// 当前值与总数
    pub fn snapshot(&self) -> (i64, i64) {
        (
            self.current.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

/// 子任务执行上下文
#[derive(Clone)]
pub struct SubTaskContext {
    pub plugin: String,
    pub name: String,
    pub options: Arc<Map<String, Value>>,
    pub task_data: Option<Arc<dyn Any + Send + Sync>>,
    pub cancel: CancellationToken,
    pub progress: Arc<Progress>,
}

impl SubTaskContext {
    pub fn new(
        plugin: impl Into<String>,
        name: impl Into<String>,
        options: Arc<Map<String, Value>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            name: name.into(),
            options,
            task_data: None,
            cancel,
            progress: Arc::new(Progress::default()),
        }
    }

    pub fn with_task_data(mut self, data: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        self.task_data = data;
        self
    }

    /// 取插件准备的任务数据
    pub fn task_data<T: Any + Send + Sync>(&self) -> Result<Arc<T>, PipelineError> {
        let data = self
            .task_data
            .clone()
            .ok_or_else(|| PipelineError::Internal(format!("{}: no task data", self.plugin)))?;
        data.downcast::<T>().map_err(|_| {
            PipelineError::Internal(format!("{}: unexpected task data type", self.plugin))
        })
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }

    pub fn option_bool(&self, key: &str) -> bool {
        self.options
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// 读取必填字符串选项
    pub fn require_str(&self, key: &str) -> Result<&str, PipelineError> {
        self.option_str(key)
            .ok_or_else(|| PipelineError::BadOptions(format!("{} is required", key)))
    }

    /// 读取必填整数选项
    pub fn require_u64(&self, key: &str) -> Result<u64, PipelineError> {
        self.option_u64(key)
            .ok_or_else(|| PipelineError::BadOptions(format!("{} is required", key)))
    }

    /// `fullSync` 选项
    pub fn full_sync(&self) -> bool {
        self.option_bool("fullSync")
    }

    /// `timeAfter` 选项
    pub fn time_after(&self) -> Result<Option<DateTime<Utc>>, PipelineError> {
        match self.option_str("timeAfter") {
            None => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| PipelineError::BadOptions(format!("timeAfter: {}", e))),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
