// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::domain::models::pipeline_plan::PipelinePlan;

/// 手动触发的 cron 配置值（大小写不敏感）
pub const MANUAL_CRON: &str = "manual";

/// 蓝图
///
/// 一个项目的数据同步配置：如何生成计划，以及何时按 cron 触发
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub id: i64,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub project_name: Option<String>,
    pub mode: BlueprintMode,
    /// 高级模式下直接执行的计划
    #[serde(default)]
    pub plan: PipelinePlan,
    /// 普通模式下用于生成计划的设置
    #[serde(default)]
    pub settings: BlueprintSettings,
    #[validate(length(min = 1))]
    pub cron_config: String,
    pub is_manual: bool,
    pub enable: bool,
    pub skip_on_fail: bool,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Blueprint {
    /// 是否需要注册到 cron
    pub fn is_scheduled(&self) -> bool {
        self.enable && !self.is_manual && !is_manual_cron(&self.cron_config)
    }
}

/// cron 配置是否表示手动触发
pub fn is_manual_cron(cron: &str) -> bool {
    cron.trim().eq_ignore_ascii_case(MANUAL_CRON)
}

/// 蓝图模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlueprintMode {
    #[default]
    Normal,
    Advanced,
}

impl fmt::Display for BlueprintMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlueprintMode::Normal => write!(f, "normal"),
            BlueprintMode::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for BlueprintMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(BlueprintMode::Normal),
            "advanced" => Ok(BlueprintMode::Advanced),
            _ => Err(format!("Invalid blueprint mode: {}", s)),
        }
    }
}

/// 普通模式蓝图设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintSettings {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub time_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connections: Vec<BlueprintConnection>,
    #[serde(default)]
    pub before_plan: Option<PipelinePlan>,
    #[serde(default)]
    pub after_plan: Option<PipelinePlan>,
}

/// 数据源连接及其范围
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintConnection {
    pub plugin_name: String,
    pub connection_id: u64,
    #[serde(default)]
    pub scopes: Vec<BlueprintScope>,
}

/// 数据范围，例如一个代码仓库或一个看板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintScope {
    pub scope_id: String,
    /// 请求的领域类型，为空表示全部
    #[serde(default)]
    pub entities: Vec<String>,
    /// 附加到任务上的插件专属选项
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// 同步策略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    pub time_after: Option<DateTime<Utc>>,
    pub full_sync: bool,
    pub skip_on_fail: bool,
}

/// 创建或更新蓝图的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub mode: BlueprintMode,
    #[serde(default)]
    pub plan: PipelinePlan,
    #[serde(default)]
    pub settings: BlueprintSettings,
    #[validate(length(min = 1))]
    pub cron_config: String,
    #[serde(default)]
    pub is_manual: bool,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default)]
    pub skip_on_fail: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_enable() -> bool {
    true
}

/// 手动触发选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOptions {
    pub full_sync: bool,
    pub skip_collectors: bool,
}
