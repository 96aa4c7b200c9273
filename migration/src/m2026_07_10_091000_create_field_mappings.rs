//! Migration to create the field_mappings table.
//!
//! Field mappings are configuration rows (not per-sync state) describing how
//! one BRD field translates to one Jira field for a given direction,
//! optionally through a named transform.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FieldMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FieldMappings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FieldMappings::SourceField).text().not_null())
                    .col(ColumnDef::new(FieldMappings::TargetField).text().not_null())
                    .col(ColumnDef::new(FieldMappings::Direction).text().not_null())
                    .col(
                        ColumnDef::new(FieldMappings::IsCustomField)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(FieldMappings::JiraFieldId).text().null())
                    .col(ColumnDef::new(FieldMappings::Transform).text().null())
                    .col(
                        ColumnDef::new(FieldMappings::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(FieldMappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FieldMappings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one active mapping per (source, target, direction) triple.
        // Partial unique index via raw SQL; the predicate syntax is shared by
        // Postgres and SQLite.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_field_mappings_active_triple \
                 ON field_mappings (source_field, target_field, direction) WHERE active"
                    .to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_field_mappings_direction_active")
                    .table(FieldMappings::Table)
                    .col(FieldMappings::Direction)
                    .col(FieldMappings::Active)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_field_mappings_active_triple")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_field_mappings_direction_active")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(FieldMappings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FieldMappings {
    Table,
    Id,
    SourceField,
    TargetField,
    Direction,
    IsCustomField,
    JiraFieldId,
    Transform,
    Active,
    CreatedAt,
    UpdatedAt,
}
