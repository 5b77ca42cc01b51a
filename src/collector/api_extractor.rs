// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::collector::traits::CollectorError;
use crate::config::settings::BatchSettings;
use crate::domain::models::raw_data::{RawDataArgs, RawDataOrigin, RawDataRecord};
use crate::domain::models::subtask::Progress;
use crate::domain::repositories::bulk_writer::BulkWriter;
use crate::domain::repositories::raw_data_repository::RawDataRepository;
use crate::domain::services::batch_save_divider::{BatchSaveDivider, BoxedEntity, DEFAULT_BATCH_SIZE};

/// 把一行原始数据抽取为若干实体
pub type ExtractFn =
    Arc<dyn Fn(&RawDataRecord) -> Result<Vec<BoxedEntity>, CollectorError> + Send + Sync>;

/// 抽取参数
pub struct ApiExtractorArgs {
    pub raw: RawDataArgs,
    pub extract: ExtractFn,
    /// 每种实体的写入批大小
    pub batch_size: usize,
    /// 每次从原始表读取的行数
    pub read_size: u64,
}

impl ApiExtractorArgs {
    pub fn new<F>(raw: RawDataArgs, extract: F) -> Self
    where
        F: Fn(&RawDataRecord) -> Result<Vec<BoxedEntity>, CollectorError> + Send + Sync + 'static,
    {
        Self {
            raw,
            extract: Arc::new(extract),
            batch_size: DEFAULT_BATCH_SIZE,
            read_size: 1000,
        }
    }

    /// 使用配置中的写入批大小
    pub fn with_settings(self, settings: &BatchSettings) -> Self {
        self.batch_size(settings.size)
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn read_size(mut self, read_size: u64) -> Self {
        self.read_size = read_size;
        self
    }
}

/// 抽取/转换结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    /// 读取的输入行数
    pub rows: u64,
    /// 产出的实体数
    pub entities: u64,
}

/// 原始数据抽取器
///
/// 按主键顺序读取 `(table, params)` 下的原始行，逐行调用抽取函数，
/// 为每个实体打上原始数据来源后交给批量保存分流器。
/// 每种实体类型在第一次出现时，先删除该类型表中由同一参数产生的旧行。
pub struct ApiExtractor {
    args: ApiExtractorArgs,
    raw_repo: Arc<dyn RawDataRepository>,
    writer: Arc<dyn BulkWriter>,
}

impl ApiExtractor {
    /// 创建抽取器
    ///
    /// # 参数
    ///
    /// * `args` - 抽取参数
    /// * `raw_repo` - 原始数据仓库
    /// * `writer` - 实体表批量写入
    pub fn new(
        args: ApiExtractorArgs,
        raw_repo: Arc<dyn RawDataRepository>,
        writer: Arc<dyn BulkWriter>,
    ) -> Result<Self, CollectorError> {
        if args.raw.table.trim().is_empty() {
            return Err(CollectorError::InvalidArgs("raw table is required".to_string()));
        }
        if args.read_size == 0 {
            return Err(CollectorError::InvalidArgs(
                "read_size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            args,
            raw_repo,
            writer,
        })
    }

    pub async fn execute(
        self,
        cancel: &CancellationToken,
        progress: Arc<Progress>,
    ) -> Result<ConvertSummary, CollectorError> {
        let table = self.args.raw.table_name();
        let params = self.args.raw.params_string();

        // a table that was never collected reads as empty
        self.raw_repo.ensure_table(&table).await?;
        let total = self.raw_repo.count_by_params(&table, &params).await?;
        progress.set(0, total as i64);

        let mut divider = BatchSaveDivider::new(self.writer.clone(), self.args.batch_size)
            .with_raw_origin(table.clone(), params.clone());
        let mut summary = ConvertSummary::default();
        let mut after_id = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(CollectorError::Cancelled);
            }
            let rows = self
                .raw_repo
                .find_by_params(&table, &params, after_id, self.args.read_size)
                .await?;
            if rows.is_empty() {
                break;
            }

            for row in rows {
                after_id = row.id;
                let entities = (self.args.extract)(&row)?;
                for mut entity in entities {
                    entity.stamp_origin(RawDataOrigin {
                        raw_data_table: table.clone(),
                        raw_data_params: params.clone(),
                        raw_data_id: row.id,
                        raw_data_remark: String::new(),
                    });
                    divider.add_boxed(entity).await?;
                    summary.entities += 1;
                }
                summary.rows += 1;
                progress.inc(1);
            }
            debug!("Extracted {} row(s) from {} so far", summary.rows, table);
        }

        divider.close().await?;
        info!(
            "Extracted {} entities from {} row(s) of {}",
            summary.entities, summary.rows, table
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[path = "api_extractor_test.rs"]
mod tests;
