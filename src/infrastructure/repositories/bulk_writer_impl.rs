// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, OnConflict, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::debug;

use crate::domain::repositories::bulk_writer::BulkWriter;
use crate::infrastructure::repositories::raw_data_repo_impl::check_table_name;
use crate::utils::errors::RepositoryError;

/// 批量写入实现
///
/// 通过 `INSERT ... ON CONFLICT (pk) DO UPDATE` 写入任意工具层或领域层表
#[derive(Clone)]
pub struct BulkWriterImpl {
    db: Arc<DatabaseConnection>,
}

impl BulkWriterImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BulkWriter for BulkWriterImpl {
    async fn upsert_rows(
        &self,
        table: &str,
        columns: &[String],
        primary_keys: &[String],
        rows: Vec<Vec<sea_orm::Value>>,
    ) -> Result<u64, RepositoryError> {
        check_table_name(table)?;
        for name in columns.iter().chain(primary_keys) {
            check_table_name(name)?;
        }
        if rows.is_empty() {
            return Ok(0);
        }
        if primary_keys.is_empty() {
            return Err(RepositoryError::InvalidParameter(format!(
                "{} has no primary key",
                table
            )));
        }

        let count = rows.len() as u64;
        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(table))
            .columns(columns.iter().map(|c| Alias::new(c.as_str())));

        for row in rows {
            if row.len() != columns.len() {
                return Err(RepositoryError::InvalidParameter(format!(
                    "{}: expected {} values, got {}",
                    table,
                    columns.len(),
                    row.len()
                )));
            }
            stmt.values(row.into_iter().map(SimpleExpr::from))
                .map_err(|e| RepositoryError::InvalidParameter(e.to_string()))?;
        }

        let updates: Vec<Alias> = columns
            .iter()
            .filter(|c| !primary_keys.contains(c))
            .map(|c| Alias::new(c.as_str()))
            .collect();
        let mut on_conflict =
            OnConflict::columns(primary_keys.iter().map(|c| Alias::new(c.as_str())));
        if updates.is_empty() {
            on_conflict.do_nothing();
        } else {
            on_conflict.update_columns(updates);
        }
        stmt.on_conflict(on_conflict);

        self.db
            .execute(self.db.get_database_backend().build(&stmt))
            .await?;
        debug!("Upserted {} rows into {}", count, table);
        Ok(count)
    }

    async fn delete_by_raw_origin(
        &self,
        table: &str,
        raw_table: &str,
        raw_params: &str,
    ) -> Result<u64, RepositoryError> {
        check_table_name(table)?;
        let stmt = Query::delete()
            .from_table(Alias::new(table))
            .and_where(Expr::col(Alias::new("_raw_data_table")).eq(raw_table))
            .and_where(Expr::col(Alias::new("_raw_data_params")).eq(raw_params))
            .to_owned();
        let result = self
            .db
            .execute(self.db.get_database_backend().build(&stmt))
            .await?;
        Ok(result.rows_affected())
    }
}
