// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::utils::errors::RepositoryError;

/// 原始数据来源列
pub const RAW_ORIGIN_COLUMNS: [&str; 4] = [
    "_raw_data_table",
    "_raw_data_params",
    "_raw_data_id",
    "_raw_data_remark",
];

/// 批量写入特质
///
/// 一次调用只写一张表；主键冲突时更新其余列
#[async_trait]
pub trait BulkWriter: Send + Sync {
    /// 批量插入或更新
    ///
    /// # 参数
    ///
    /// * `table` - 目标表名
    /// * `columns` - 列名，与每行的值一一对应
    /// * `primary_keys` - 冲突判定列
    /// * `rows` - 行数据
    ///
    /// # 返回值
    ///
    /// 写入的行数
    async fn upsert_rows(
        &self,
        table: &str,
        columns: &[String],
        primary_keys: &[String],
        rows: Vec<Vec<sea_orm::Value>>,
    ) -> Result<u64, RepositoryError>;

    /// 删除由指定原始数据参数产生的行
    async fn delete_by_raw_origin(
        &self,
        table: &str,
        raw_table: &str,
        raw_params: &str,
    ) -> Result<u64, RepositoryError>;
}
