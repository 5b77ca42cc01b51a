// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use sea_orm::sea_query::{
    Alias, ColumnDef, Expr, Func, Index, Order, Query, Table,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult};
use tracing::debug;

use crate::domain::models::raw_data::{NewRawData, RawDataRecord};
use crate::domain::repositories::raw_data_repository::RawDataRepository;
use crate::utils::errors::RepositoryError;

/// 原始数据仓库实现
///
/// 原始表按名称动态创建，使用 sea_query 构建语句，
/// 由连接的后端（postgres / sqlite）生成对应方言
#[derive(Clone)]
pub struct RawDataRepoImpl {
    db: Arc<DatabaseConnection>,
    created: Arc<DashSet<String>>,
}

impl RawDataRepoImpl {
    /// 创建新的原始数据仓库实现
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            created: Arc::new(DashSet::new()),
        }
    }
}

/// 校验表名，仅允许字母、数字和下划线
pub(crate) fn check_table_name(table: &str) -> Result<(), RepositoryError> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RepositoryError::InvalidParameter(format!(
            "invalid table name: {:?}",
            table
        )));
    }
    Ok(())
}

fn col(name: &str) -> Alias {
    Alias::new(name)
}

fn to_record(row: &QueryResult) -> Result<RawDataRecord, RepositoryError> {
    let id = row
        .try_get::<i64>("", "id")
        .or_else(|_| row.try_get::<i32>("", "id").map(i64::from))?;
    Ok(RawDataRecord {
        id,
        params: row.try_get("", "params")?,
        data: row.try_get("", "data")?,
        url: row.try_get("", "url")?,
        input: row.try_get("", "input")?,
        created_at: row.try_get::<DateTime<Utc>>("", "created_at")?,
    })
}

#[async_trait]
impl RawDataRepository for RawDataRepoImpl {
    async fn ensure_table(&self, table: &str) -> Result<(), RepositoryError> {
        check_table_name(table)?;
        if self.created.contains(table) {
            return Ok(());
        }

        let backend = self.db.get_database_backend();
        let create = Table::create()
            .table(col(table))
            .if_not_exists()
            .col(
                ColumnDef::new(col("id"))
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(col("params")).text().not_null())
            .col(ColumnDef::new(col("data")).blob().not_null())
            .col(ColumnDef::new(col("url")).text().not_null())
            .col(ColumnDef::new(col("input")).blob().null())
            .col(
                ColumnDef::new(col("created_at"))
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .to_owned();
        self.db.execute(backend.build(&create)).await?;

        let index = Index::create()
            .if_not_exists()
            .name(format!("idx_{}_params", table))
            .table(col(table))
            .col(col("params"))
            .to_owned();
        self.db.execute(backend.build(&index)).await?;

        debug!("Raw table {} is ready", table);
        self.created.insert(table.to_string());
        Ok(())
    }

    async fn delete_by_params(&self, table: &str, params: &str) -> Result<u64, RepositoryError> {
        check_table_name(table)?;
        let stmt = Query::delete()
            .from_table(col(table))
            .and_where(Expr::col(col("params")).eq(params))
            .to_owned();
        let result = self
            .db
            .execute(self.db.get_database_backend().build(&stmt))
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert(&self, table: &str, rows: Vec<NewRawData>) -> Result<u64, RepositoryError> {
        check_table_name(table)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut stmt = Query::insert();
        stmt.into_table(col(table)).columns([
            col("params"),
            col("data"),
            col("url"),
            col("input"),
            col("created_at"),
        ]);
        for row in rows {
            stmt.values([
                row.params.into(),
                row.data.into(),
                row.url.into(),
                row.input.into(),
                now.into(),
            ])
            .map_err(|e| RepositoryError::InvalidParameter(e.to_string()))?;
        }

        let result = self
            .db
            .execute(self.db.get_database_backend().build(&stmt))
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_by_params(&self, table: &str, params: &str) -> Result<u64, RepositoryError> {
        check_table_name(table)?;
        let stmt = Query::select()
            .expr_as(Func::count(Expr::col(col("id"))), col("cnt"))
            .from(col(table))
            .and_where(Expr::col(col("params")).eq(params))
            .to_owned();
        let row = self
            .db
            .query_one(self.db.get_database_backend().build(&stmt))
            .await?;
        let count = match row {
            Some(row) => row.try_get::<i64>("", "cnt")?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    async fn find_by_params(
        &self,
        table: &str,
        params: &str,
        after_id: i64,
        limit: u64,
    ) -> Result<Vec<RawDataRecord>, RepositoryError> {
        check_table_name(table)?;
        let stmt = Query::select()
            .columns([
                col("id"),
                col("params"),
                col("data"),
                col("url"),
                col("input"),
                col("created_at"),
            ])
            .from(col(table))
            .and_where(Expr::col(col("params")).eq(params))
            .and_where(Expr::col(col("id")).gt(after_id))
            .order_by(col("id"), Order::Asc)
            .limit(limit)
            .to_owned();

        let rows = self
            .db
            .query_all(self.db.get_database_backend().build(&stmt))
            .await?;
        rows.iter().map(to_record).collect()
    }
}
