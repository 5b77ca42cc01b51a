// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::*;

use crate::domain::models::blueprint::{is_manual_cron, Blueprint, BlueprintInput};
use crate::domain::repositories::blueprint_repository::BlueprintRepository;
use crate::infrastructure::database::entities::blueprint as blueprint_entity;
use crate::utils::errors::RepositoryError;

/// 蓝图仓库实现
#[derive(Clone)]
pub struct BlueprintRepoImpl {
    db: Arc<DatabaseConnection>,
}

impl BlueprintRepoImpl {
    /// 创建新的蓝图仓库实现
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn to_id(id: i64) -> Result<i32, RepositoryError> {
        i32::try_from(id).map_err(|_| RepositoryError::InvalidParameter(format!("id {}", id)))
    }
}

/// 把输入写入 ActiveModel 的可变列
fn apply_input(
    model: &mut blueprint_entity::ActiveModel,
    input: &BlueprintInput,
) -> Result<(), RepositoryError> {
    model.name = Set(input.name.clone());
    model.project_name = Set(input.project_name.clone());
    model.mode = Set(input.mode.to_string());
    model.plan = Set(serde_json::to_string(&input.plan)?);
    model.settings = Set(serde_json::to_string(&input.settings)?);
    model.cron_config = Set(input.cron_config.clone());
    model.is_manual = Set(input.is_manual || is_manual_cron(&input.cron_config));
    model.enable = Set(input.enable);
    model.skip_on_fail = Set(input.skip_on_fail);
    model.labels = Set(serde_json::to_string(&input.labels)?);
    model.updated_at = Set(Utc::now().into());
    Ok(())
}

impl TryFrom<blueprint_entity::Model> for Blueprint {
    type Error = RepositoryError;

    fn try_from(model: blueprint_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id as i64,
            name: model.name,
            project_name: model.project_name,
            mode: model
                .mode
                .parse()
                .map_err(RepositoryError::InvalidParameter)?,
            plan: serde_json::from_str(&model.plan)?,
            settings: serde_json::from_str(&model.settings)?,
            cron_config: model.cron_config,
            is_manual: model.is_manual,
            enable: model.enable,
            skip_on_fail: model.skip_on_fail,
            labels: serde_json::from_str(&model.labels)?,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }
}

#[async_trait]
impl BlueprintRepository for BlueprintRepoImpl {
    async fn create(&self, input: &BlueprintInput) -> Result<Blueprint, RepositoryError> {
        let mut model = blueprint_entity::ActiveModel {
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };
        apply_input(&mut model, input)?;

        let saved = model.insert(self.db.as_ref()).await?;
        saved.try_into()
    }

    async fn update(&self, id: i64, input: &BlueprintInput) -> Result<Blueprint, RepositoryError> {
        let existing = blueprint_entity::Entity::find_by_id(Self::to_id(id)?)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let mut model: blueprint_entity::ActiveModel = existing.into();
        apply_input(&mut model, input)?;
        let saved = model.update(self.db.as_ref()).await?;
        saved.try_into()
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let result = blueprint_entity::Entity::delete_by_id(Self::to_id(id)?)
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Blueprint>, RepositoryError> {
        blueprint_entity::Entity::find_by_id(Self::to_id(id)?)
            .one(self.db.as_ref())
            .await?
            .map(Blueprint::try_from)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Blueprint>, RepositoryError> {
        blueprint_entity::Entity::find()
            .order_by_asc(blueprint_entity::Column::Id)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(Blueprint::try_from)
            .collect()
    }

    async fn list_scheduled(&self) -> Result<Vec<Blueprint>, RepositoryError> {
        let models = blueprint_entity::Entity::find()
            .filter(blueprint_entity::Column::Enable.eq(true))
            .filter(blueprint_entity::Column::IsManual.eq(false))
            .order_by_asc(blueprint_entity::Column::Id)
            .all(self.db.as_ref())
            .await?;

        let mut blueprints = Vec::with_capacity(models.len());
        for model in models {
            let blueprint = Blueprint::try_from(model)?;
            if blueprint.is_scheduled() {
                blueprints.push(blueprint);
            }
        }
        Ok(blueprints)
    }
}
