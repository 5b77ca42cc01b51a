// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "blueprints")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub project_name: Option<String>,
    pub mode: String,
    /// 高级模式计划的 JSON
    #[sea_orm(column_type = "Text")]
    pub plan: String,
    /// 普通模式设置的 JSON
    #[sea_orm(column_type = "Text")]
    pub settings: String,
    pub cron_config: String,
    pub is_manual: bool,
    pub enable: bool,
    pub skip_on_fail: bool,
    #[sea_orm(column_type = "Text")]
    pub labels: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
