// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::blueprint::{Blueprint, BlueprintInput};
use crate::utils::errors::RepositoryError;

/// 蓝图仓库特质
#[async_trait]
pub trait BlueprintRepository: Send + Sync {
    /// 创建蓝图
    async fn create(&self, input: &BlueprintInput) -> Result<Blueprint, RepositoryError>;
    /// 更新蓝图，不存在时返回 `NotFound`
    async fn update(&self, id: i64, input: &BlueprintInput) -> Result<Blueprint, RepositoryError>;
    /// 删除蓝图
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
    /// 根据ID查找
    async fn find_by_id(&self, id: i64) -> Result<Option<Blueprint>, RepositoryError>;
    /// 列出所有蓝图
    async fn list(&self) -> Result<Vec<Blueprint>, RepositoryError>;
    /// 列出需要注册到 cron 的蓝图
    async fn list_scheduled(&self) -> Result<Vec<Blueprint>, RepositoryError>;
}
