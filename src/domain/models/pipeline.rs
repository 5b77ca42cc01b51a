// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::pipeline_plan::PipelinePlan;
use crate::utils::errors::ErrorKind;

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Created,
    Running,
    Completed,
    /// 有任务失败但 skip_on_fail 让其余阶段继续执行
    PartialSuccess,
    Failed,
    Cancelled,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineStatus::Created => write!(f, "created"),
            PipelineStatus::Running => write!(f, "running"),
            PipelineStatus::Completed => write!(f, "completed"),
            PipelineStatus::PartialSuccess => write!(f, "partial_success"),
            PipelineStatus::Failed => write!(f, "failed"),
            PipelineStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// 任务执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub plugin: String,
    pub stage: usize,
    pub status: PipelineStatus,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

/// 流水线执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: Uuid,
    pub blueprint_id: Option<i64>,
    pub plan: PipelinePlan,
    pub status: PipelineStatus,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub tasks: Vec<TaskRecord>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRecord {
    pub fn new(blueprint_id: Option<i64>, plan: PipelinePlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            blueprint_id,
            plan,
            status: PipelineStatus::Created,
            error: None,
            error_kind: None,
            tasks: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// 失败的任务数
    pub fn failed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == PipelineStatus::Failed)
            .count()
    }
}
