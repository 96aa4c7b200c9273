//! # FieldMapping Repository
//!
//! Configuration rows for the field mapper. At most one active row may
//! exist per `(source_field, target_field, direction)` triple; the
//! partial unique index enforces this and duplicates map to 409.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::models::field_mapping::{ActiveModel, Column, Entity, Model};

/// Fields accepted when creating a field mapping rule.
#[derive(Debug, Clone)]
pub struct NewFieldMapping {
    pub source_field: String,
    pub target_field: String,
    pub direction: String,
    pub is_custom_field: bool,
    pub jira_field_id: Option<String>,
    pub transform: String,
    pub active: bool,
}

/// Repository for field mapping configuration operations
#[derive(Debug, Clone)]
pub struct FieldMappingRepository {
    db: DatabaseConnection,
}

impl FieldMappingRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// All active rules, in a stable order.
    pub async fn list_active(&self) -> Result<Vec<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::Active.eq(true))
            .order_by_asc(Column::SourceField)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }

    /// All rules, active or not.
    pub async fn list_all(&self) -> Result<Vec<Model>, ApiError> {
        Ok(Entity::find()
            .order_by_asc(Column::SourceField)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn create(&self, new: NewFieldMapping) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();
        let id = Uuid::new_v4();

        let rule = ActiveModel {
            id: Set(id),
            source_field: Set(new.source_field),
            target_field: Set(new.target_field),
            direction: Set(new.direction),
            is_custom_field: Set(new.is_custom_field),
            jira_field_id: Set(new.jira_field_id),
            transform: Set(Some(new.transform)),
            active: Set(new.active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        rule.insert(&self.db).await?;

        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| not_found("field mapping", &id.to_string()))
    }

    /// Deactivate a rule. The partial unique index only covers active
    /// rows, so a replacement rule can be created afterwards.
    pub async fn deactivate(&self, id: Uuid) -> Result<Model, ApiError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| not_found("field mapping", &id.to_string()))?;

        let mut active: ActiveModel = existing.into();
        active.active = Set(false);
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }
}
