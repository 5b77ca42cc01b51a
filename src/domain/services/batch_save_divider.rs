// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use metrics::counter;
use tracing::debug;

use crate::domain::models::raw_data::{HasRawOrigin, RawDataOrigin};
use crate::domain::repositories::bulk_writer::{BulkWriter, RAW_ORIGIN_COLUMNS};
use crate::utils::errors::RepositoryError;

/// 默认批大小
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// 可批量持久化的实体
///
/// 工具层或领域层的表模型。`values` 的顺序必须与 `columns` 一致，
/// 原始数据来源列由批量写入时自动追加。
pub trait Persistable: HasRawOrigin + Send + Sync + 'static {
    fn table_name() -> &'static str;
    fn primary_keys() -> &'static [&'static str];
    fn columns() -> &'static [&'static str];
    fn values(&self) -> Vec<sea_orm::Value>;
}

/// 单一类型的批量写入缓冲
pub struct BatchSave<T: Persistable> {
    writer: Arc<dyn BulkWriter>,
    rows: Vec<T>,
    capacity: usize,
    columns: Vec<String>,
    primary_keys: Vec<String>,
    flushed: u64,
}

impl<T: Persistable> BatchSave<T> {
    pub fn new(writer: Arc<dyn BulkWriter>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let columns = T::columns()
            .iter()
            .chain(RAW_ORIGIN_COLUMNS.iter())
            .map(|c| c.to_string())
            .collect();
        Self {
            writer,
            rows: Vec::with_capacity(capacity),
            capacity,
            columns,
            primary_keys: T::primary_keys().iter().map(|c| c.to_string()).collect(),
            flushed: 0,
        }
    }

    /// 加入一个实体，缓冲已满时立即写入
    pub async fn add(&mut self, entity: T) -> Result<(), RepositoryError> {
        self.rows.push(entity);
        if self.rows.len() >= self.capacity {
            self.flush().await?;
        }
        Ok(())
    }

    /// 写入缓冲中的所有实体
    pub async fn flush(&mut self) -> Result<(), RepositoryError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let rows: Vec<Vec<sea_orm::Value>> = self
            .rows
            .drain(..)
            .map(|entity| {
                let origin = entity.raw_origin();
                let mut values = entity.values();
                values.push(origin.raw_data_table.clone().into());
                values.push(origin.raw_data_params.clone().into());
                values.push(origin.raw_data_id.into());
                values.push(origin.raw_data_remark.clone().into());
                values
            })
            .collect();

        let count = self
            .writer
            .upsert_rows(T::table_name(), &self.columns, &self.primary_keys, rows)
            .await?;
        self.flushed += count;
        counter!("batch_rows_flushed_total", "table" => T::table_name()).increment(count);
        Ok(())
    }

    /// 缓冲中尚未写入的实体数
    pub fn pending(&self) -> usize {
        self.rows.len()
    }

    /// 已写入的实体数
    pub fn flushed(&self) -> u64 {
        self.flushed
    }
}

#[async_trait]
trait ErasedBatch: Send {
    async fn flush(&mut self) -> Result<(), RepositoryError>;
    fn table(&self) -> &'static str;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[async_trait]
impl<T: Persistable> ErasedBatch for BatchSave<T> {
    async fn flush(&mut self) -> Result<(), RepositoryError> {
        BatchSave::flush(self).await
    }

    fn table(&self) -> &'static str {
        T::table_name()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 批量保存分流器
///
/// 按实体的具体类型把异构实体分流到各自的缓冲中，一次批量写入只包含一种类型。
/// 分流器属于单个转换过程，调用方必须在结束时调用一次 [`BatchSaveDivider::close`]。
pub struct BatchSaveDivider {
    writer: Arc<dyn BulkWriter>,
    batch_size: usize,
    batches: HashMap<TypeId, Box<dyn ErasedBatch>>,
    order: Vec<TypeId>,
    raw_origin: Option<(String, String)>,
    closed: bool,
}

impl BatchSaveDivider {
    pub fn new(writer: Arc<dyn BulkWriter>, batch_size: usize) -> Self {
        Self {
            writer,
            batch_size,
            batches: HashMap::new(),
            order: Vec::new(),
            raw_origin: None,
            closed: false,
        }
    }

    /// 首次遇到某类型时，先删除该类型表中由同一原始数据参数产生的旧行
    pub fn with_raw_origin(mut self, raw_table: impl Into<String>, raw_params: impl Into<String>) -> Self {
        self.raw_origin = Some((raw_table.into(), raw_params.into()));
        self
    }

    /// 获取某类型的缓冲，不存在时创建
    pub async fn for_type<T: Persistable>(&mut self) -> Result<&mut BatchSave<T>, RepositoryError> {
        if self.closed {
            return Err(RepositoryError::InvalidParameter(
                "batch save divider is closed".to_string(),
            ));
        }

        let id = TypeId::of::<T>();
        if !self.batches.contains_key(&id) {
            if let Some((raw_table, raw_params)) = &self.raw_origin {
                let deleted = self
                    .writer
                    .delete_by_raw_origin(T::table_name(), raw_table, raw_params)
                    .await?;
                debug!(
                    "Deleted {} rows from {} produced by {}",
                    deleted,
                    T::table_name(),
                    raw_table
                );
            }
            self.batches.insert(
                id,
                Box::new(BatchSave::<T>::new(self.writer.clone(), self.batch_size)),
            );
            self.order.push(id);
        }

        self.batches
            .get_mut(&id)
            .and_then(|batch| batch.as_any_mut().downcast_mut::<BatchSave<T>>())
            .ok_or_else(|| {
                RepositoryError::InvalidParameter(format!(
                    "batch for {} has an unexpected type",
                    T::table_name()
                ))
            })
    }

    /// 加入一个实体
    pub async fn add<T: Persistable>(&mut self, entity: T) -> Result<(), RepositoryError> {
        self.for_type::<T>().await?.add(entity).await
    }

    /// 写入所有剩余缓冲
    ///
    /// 只有第一次调用生效；任一类型写入失败时立即返回，已写入的类型不回滚
    pub async fn close(&mut self) -> Result<(), RepositoryError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for id in &self.order {
            if let Some(batch) = self.batches.get_mut(id) {
                batch.flush().await?;
                debug!("Closed batch for {}", batch.table());
            }
        }
        Ok(())
    }
}

/// 类型擦除后的待保存实体
///
/// 一次抽取或转换可以产出多种实体类型，装箱后统一交给分流器
pub trait AnyEntity: Send {
    /// 写入原始数据来源
    fn stamp_origin(&mut self, origin: RawDataOrigin);
    /// 按实体的具体类型加入分流器
    fn save_into<'a>(
        self: Box<Self>,
        divider: &'a mut BatchSaveDivider,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;
}

impl<T: Persistable> AnyEntity for T {
    fn stamp_origin(&mut self, origin: RawDataOrigin) {
        self.set_raw_origin(origin);
    }

    fn save_into<'a>(
        self: Box<Self>,
        divider: &'a mut BatchSaveDivider,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(async move { divider.add(*self).await })
    }
}

/// 装箱的实体
pub type BoxedEntity = Box<dyn AnyEntity>;

/// 把具体实体装箱
pub fn boxed<T: Persistable>(entity: T) -> BoxedEntity {
    Box::new(entity)
}

impl BatchSaveDivider {
    /// 加入一个装箱实体
    pub async fn add_boxed(&mut self, entity: BoxedEntity) -> Result<(), RepositoryError> {
        entity.save_into(self).await
    }
}

#[cfg(test)]
#[path = "batch_save_divider_test.rs"]
mod tests;
