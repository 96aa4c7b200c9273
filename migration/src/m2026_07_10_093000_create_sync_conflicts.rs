//! Migration to create the sync_conflicts table.
//!
//! Conflicts form the append-only decision register of the sync engine.
//! The value snapshots are populated at detection time and the resolution
//! columns are written exactly once by the pending→resolved transition.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncConflicts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncConflicts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncConflicts::MappingId).uuid().not_null())
                    .col(ColumnDef::new(SyncConflicts::BrdId).text().not_null())
                    .col(ColumnDef::new(SyncConflicts::JiraKey).text().not_null())
                    .col(ColumnDef::new(SyncConflicts::ConflictType).text().not_null())
                    .col(ColumnDef::new(SyncConflicts::Field).text().not_null())
                    .col(ColumnDef::new(SyncConflicts::BaseValue).json_binary().null())
                    .col(ColumnDef::new(SyncConflicts::LocalValue).json_binary().null())
                    .col(ColumnDef::new(SyncConflicts::RemoteValue).json_binary().null())
                    .col(
                        ColumnDef::new(SyncConflicts::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(SyncConflicts::ResolutionStrategy)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncConflicts::ResolvedValue)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncConflicts::ResolvedBy).text().null())
                    .col(
                        ColumnDef::new(SyncConflicts::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncConflicts::DetectedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncConflicts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncConflicts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_conflicts_mapping_id")
                            .from(SyncConflicts::Table, SyncConflicts::MappingId)
                            .to(SyncMappings::Table, SyncMappings::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Pending-conflict views per mapping and per BRD.
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_conflicts_mapping_status")
                    .table(SyncConflicts::Table)
                    .col(SyncConflicts::MappingId)
                    .col(SyncConflicts::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_conflicts_brd_status")
                    .table(SyncConflicts::Table)
                    .col(SyncConflicts::BrdId)
                    .col(SyncConflicts::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_conflicts_mapping_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_conflicts_brd_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncConflicts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncConflicts {
    Table,
    Id,
    MappingId,
    BrdId,
    JiraKey,
    ConflictType,
    Field,
    BaseValue,
    LocalValue,
    RemoteValue,
    Status,
    ResolutionStrategy,
    ResolvedValue,
    ResolvedBy,
    ResolvedAt,
    DetectedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SyncMappings {
    Table,
    Id,
}
