// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

use crate::domain::models::blueprint::{Blueprint, BlueprintInput, BlueprintMode, TriggerOptions};
use crate::domain::models::pipeline::PipelineRecord;
use crate::domain::plugin::PluginRegistry;
use crate::domain::repositories::blueprint_repository::BlueprintRepository;
use crate::queue::scheduler::{validate_cron, BlueprintScheduler, SchedulerError};
use crate::utils::errors::{Classify, ErrorKind, RepositoryError};

/// 蓝图服务错误类型
#[derive(Error, Debug)]
pub enum BlueprintServiceError {
    /// 输入校验失败
    #[error("Invalid blueprint: {0}")]
    Validation(String),
    #[error("Blueprint {0} not found")]
    NotFound(i64),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl Classify for BlueprintServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            BlueprintServiceError::Validation(_) => ErrorKind::BadInput,
            BlueprintServiceError::NotFound(_) => ErrorKind::NotFound,
            BlueprintServiceError::Repository(e) => e.kind(),
            BlueprintServiceError::Scheduler(e) => e.kind(),
        }
    }
}

/// 蓝图服务
///
/// 负责蓝图的增删改查与手动触发，每次变更成功后全量重载调度
pub struct BlueprintService {
    repo: Arc<dyn BlueprintRepository>,
    registry: Arc<PluginRegistry>,
    scheduler: Arc<BlueprintScheduler>,
}

impl BlueprintService {
    pub fn new(
        repo: Arc<dyn BlueprintRepository>,
        registry: Arc<PluginRegistry>,
        scheduler: Arc<BlueprintScheduler>,
    ) -> Self {
        Self {
            repo,
            registry,
            scheduler,
        }
    }

    /// 创建蓝图
    ///
    /// # 参数
    ///
    /// * `input` - 蓝图输入
    ///
    /// # 返回值
    ///
    /// * `Ok(Blueprint)` - 已保存的蓝图
    /// * `Err(BlueprintServiceError)` - 校验、存储或重载失败
    pub async fn create(&self, input: BlueprintInput) -> Result<Blueprint, BlueprintServiceError> {
        self.validate(&input)?;
        let blueprint = self.repo.create(&input).await?;
        info!("Created blueprint {} ({})", blueprint.id, blueprint.name);
        self.reload().await?;
        Ok(blueprint)
    }

    /// 整体替换蓝图的可变字段
    pub async fn update(
        &self,
        id: i64,
        input: BlueprintInput,
    ) -> Result<Blueprint, BlueprintServiceError> {
        self.validate(&input)?;
        let blueprint = self
            .repo
            .update(id, &input)
            .await
            .map_err(|e| not_found_as(id, e))?;
        info!("Updated blueprint {} ({})", blueprint.id, blueprint.name);
        self.reload().await?;
        Ok(blueprint)
    }

    pub async fn delete(&self, id: i64) -> Result<(), BlueprintServiceError> {
        self.repo.delete(id).await.map_err(|e| not_found_as(id, e))?;
        info!("Deleted blueprint {}", id);
        self.reload().await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Blueprint, BlueprintServiceError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(BlueprintServiceError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Blueprint>, BlueprintServiceError> {
        Ok(self.repo.list().await?)
    }

    /// 立即运行蓝图，手动蓝图也可以触发
    pub async fn trigger(
        &self,
        id: i64,
        options: TriggerOptions,
    ) -> Result<PipelineRecord, BlueprintServiceError> {
        self.scheduler.fire(id, options).await.map_err(|e| match e {
            SchedulerError::BlueprintNotFound(id) => BlueprintServiceError::NotFound(id),
            other => other.into(),
        })
    }

    /// 重新注册全部定时蓝图
    pub async fn reload(&self) -> Result<usize, BlueprintServiceError> {
        self.scheduler.reload().await.map_err(|e| {
            error!("Failed to reload blueprint schedule: {}", e);
            e.into()
        })
    }

    fn validate(&self, input: &BlueprintInput) -> Result<(), BlueprintServiceError> {
        input
            .validate()
            .map_err(|e| BlueprintServiceError::Validation(e.to_string()))?;
        validate_cron(&input.cron_config)?;

        match input.mode {
            BlueprintMode::Advanced => {
                if input.plan.is_empty() {
                    return Err(BlueprintServiceError::Validation(
                        "advanced mode requires a plan".to_string(),
                    ));
                }
                for task in input.plan.tasks() {
                    self.require_plugin(&task.plugin)?;
                }
            }
            BlueprintMode::Normal => {
                for connection in &input.settings.connections {
                    self.require_plugin(&connection.plugin_name)?;
                }
            }
        }
        Ok(())
    }

    fn require_plugin(&self, name: &str) -> Result<(), BlueprintServiceError> {
        if self.registry.get(name).is_none() {
            return Err(BlueprintServiceError::Validation(format!(
                "unknown plugin {}",
                name
            )));
        }
        Ok(())
    }
}

fn not_found_as(id: i64, e: RepositoryError) -> BlueprintServiceError {
    match e {
        RepositoryError::NotFound => BlueprintServiceError::NotFound(id),
        other => other.into(),
    }
}

#[cfg(test)]
#[path = "blueprint_service_test.rs"]
mod tests;
