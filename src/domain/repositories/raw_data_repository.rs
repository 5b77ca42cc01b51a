// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::raw_data::{NewRawData, RawDataRecord};
use crate::utils::errors::RepositoryError;

/// 原始数据仓库特质
///
/// 所有方法的 `table` 参数均为带 `_raw_` 前缀的完整表名
#[async_trait]
pub trait RawDataRepository: Send + Sync {
    /// 表不存在时创建
    async fn ensure_table(&self, table: &str) -> Result<(), RepositoryError>;
    /// 删除指定参数下的所有行
    async fn delete_by_params(&self, table: &str, params: &str) -> Result<u64, RepositoryError>;
    /// 批量写入
    async fn insert(&self, table: &str, rows: Vec<NewRawData>) -> Result<u64, RepositoryError>;
    /// 统计指定参数下的行数
    async fn count_by_params(&self, table: &str, params: &str) -> Result<u64, RepositoryError>;
    /// 按主键升序分页读取 `id > after_id` 的行
    async fn find_by_params(
        &self,
        table: &str,
        params: &str,
        after_id: i64,
        limit: u64,
    ) -> Result<Vec<RawDataRecord>, RepositoryError>;
}
