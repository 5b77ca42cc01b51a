// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::collector::traits::CollectorError;
use crate::domain::services::domain_id::DomainIdError;
use crate::domain::services::plan_builder::PlanError;

/// 错误类别
///
/// 流水线、任务记录只关心错误的类别而不关心具体类型：
/// - `BadInput`: 选项或计划格式错误，执行前即被拒绝，不重试
/// - `NotFound`: 上游资源不存在，通常被降级为空页
/// - `Internal`: 意外失败，中止当前子任务
/// - `Cancelled`: 由取消令牌传播而来，不作为错误记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadInput,
    NotFound,
    Internal,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::BadInput => write!(f, "bad_input"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Internal => write!(f, "internal"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// 可归类错误特质
pub trait Classify {
    /// 返回错误类别
    fn kind(&self) -> ErrorKind;
}

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("数据库错误: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("未找到数据")]
    NotFound,

    #[error("无效参数: {0}")]
    InvalidParameter(String),
}

impl Classify for RepositoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound => ErrorKind::NotFound,
            RepositoryError::InvalidParameter(_) => ErrorKind::BadInput,
            _ => ErrorKind::Internal,
        }
    }
}

/// 流水线执行错误类型
///
/// 子任务、任务和流水线记录最终呈现的错误
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("插件未注册: {0}")]
    PluginNotFound(String),

    #[error("插件 {plugin} 不存在子任务: {subtask}")]
    SubTaskNotFound { plugin: String, subtask: String },

    #[error("任务选项无效: {0}")]
    BadOptions(String),

    #[error("采集错误: {0}")]
    Collector(#[from] CollectorError),

    #[error("仓库错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("计划错误: {0}")]
    Plan(#[from] PlanError),

    #[error("DomainId 错误: {0}")]
    DomainId(#[from] DomainIdError),

    #[error("已取消")]
    Cancelled,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl Classify for PipelineError {
    fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::PluginNotFound(_)
            | PipelineError::SubTaskNotFound { .. }
            | PipelineError::BadOptions(_) => ErrorKind::BadInput,
            PipelineError::Collector(e) => e.kind(),
            PipelineError::Repository(e) => e.kind(),
            PipelineError::Plan(e) => e.kind(),
            PipelineError::DomainId(e) => e.kind(),
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_kind_follows_source() {
        let err = PipelineError::from(CollectorError::Cancelled);
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let err = PipelineError::from(RepositoryError::NotFound);
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = PipelineError::BadOptions("connectionId missing".to_string());
        assert_eq!(err.kind(), ErrorKind::BadInput);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BadInput).unwrap();
        assert_eq!(json, "\"bad_input\"");
        assert_eq!(ErrorKind::Cancelled.to_string(), "cancelled");
    }
}
