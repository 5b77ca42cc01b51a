// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collector::api_extractor::ConvertSummary;
use crate::collector::traits::CollectorError;
use crate::config::settings::BatchSettings;
use crate::domain::models::raw_data::{HasRawOrigin, RawDataArgs};
use crate::domain::models::subtask::Progress;
use crate::domain::repositories::bulk_writer::BulkWriter;
use crate::domain::services::batch_save_divider::{BatchSaveDivider, BoxedEntity, DEFAULT_BATCH_SIZE};

/// 把一行工具层数据转换为若干领域实体
pub type ConvertFn<R> = Arc<dyn Fn(R) -> Result<Vec<BoxedEntity>, CollectorError> + Send + Sync>;

/// 转换参数
///
/// `raw` 指明输入行来自哪组原始数据参数，用于在写入前清理上一次转换的结果
pub struct DataConverterArgs<R> {
    pub raw: RawDataArgs,
    pub input: BoxStream<'static, Result<R, CollectorError>>,
    pub convert: ConvertFn<R>,
    pub batch_size: usize,
}

impl<R> DataConverterArgs<R> {
    pub fn new<F>(
        raw: RawDataArgs,
        input: BoxStream<'static, Result<R, CollectorError>>,
        convert: F,
    ) -> Self
    where
        F: Fn(R) -> Result<Vec<BoxedEntity>, CollectorError> + Send + Sync + 'static,
    {
        Self {
            raw,
            input,
            convert: Arc::new(convert),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_settings(self, settings: &BatchSettings) -> Self {
        self.batch_size(settings.size)
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// 数据转换器
///
/// 消费工具层行流，每行转换出的实体继承该行的原始数据来源
pub struct DataConverter<R> {
    args: DataConverterArgs<R>,
    writer: Arc<dyn BulkWriter>,
}

impl<R> DataConverter<R>
where
    R: HasRawOrigin + Send + 'static,
{
    pub fn new(args: DataConverterArgs<R>, writer: Arc<dyn BulkWriter>) -> Result<Self, CollectorError> {
        if args.raw.table.trim().is_empty() {
            return Err(CollectorError::InvalidArgs("raw table is required".to_string()));
        }
        Ok(Self { args, writer })
    }

    /// 执行转换
    ///
    /// # 返回值
    ///
    /// 输入流结束且所有缓冲写入后返回统计；输入流、转换函数或写入的第一个错误会中止转换
    pub async fn execute(
        self,
        cancel: &CancellationToken,
        progress: Arc<Progress>,
    ) -> Result<ConvertSummary, CollectorError> {
        let DataConverterArgs {
            raw,
            mut input,
            convert,
            batch_size,
        } = self.args;
        let table = raw.table_name();

        let mut divider = BatchSaveDivider::new(self.writer, batch_size)
            .with_raw_origin(table.clone(), raw.params_string());
        let mut summary = ConvertSummary::default();
        progress.set(0, -1);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
                next = input.next() => next,
            };
            let Some(row) = next else {
                break;
            };
            let row = row?;
            let origin = row.raw_origin().clone();
            for mut entity in convert(row)? {
                entity.stamp_origin(origin.clone());
                divider.add_boxed(entity).await?;
                summary.entities += 1;
            }
            summary.rows += 1;
            progress.inc(1);
        }

        divider.close().await?;
        info!(
            "Converted {} row(s) from {} into {} entities",
            summary.rows, table, summary.entities
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[path = "data_converter_test.rs"]
mod tests;
