// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Blueprints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Blueprints::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Blueprints::Name).string().not_null())
                    .col(ColumnDef::new(Blueprints::ProjectName).string().null())
                    .col(
                        ColumnDef::new(Blueprints::Mode)
                            .string_len(20)
                            .not_null()
                            .default("normal"),
                    )
                    .col(ColumnDef::new(Blueprints::Plan).text().not_null())
                    .col(ColumnDef::new(Blueprints::Settings).text().not_null())
                    .col(ColumnDef::new(Blueprints::CronConfig).string().not_null())
                    .col(
                        ColumnDef::new(Blueprints::IsManual)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Blueprints::Enable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Blueprints::SkipOnFail)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Blueprints::Labels).text().not_null())
                    .col(
                        ColumnDef::new(Blueprints::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Blueprints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_blueprints_enable_is_manual")
                    .table(Blueprints::Table)
                    .col(Blueprints::Enable)
                    .col(Blueprints::IsManual)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Blueprints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Blueprints {
    Table,
    Id,
    Name,
    ProjectName,
    Mode,
    Plan,
    Settings,
    CronConfig,
    IsManual,
    Enable,
    SkipOnFail,
    Labels,
    CreatedAt,
    UpdatedAt,
}
