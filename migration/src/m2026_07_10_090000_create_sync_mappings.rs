//! Migration to create the sync_mappings table.
//!
//! A sync mapping is the persistent pairing between one BRD and one Jira
//! issue, carrying sync timestamps, enablement flags, the conflict counter,
//! and the field snapshot taken at the last successful sync (the three-way
//! merge base).

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
                    .table(SyncMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncMappings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncMappings::BrdId).text().not_null())
                    .col(ColumnDef::new(SyncMappings::JiraKey).text().not_null())
                    .col(ColumnDef::new(SyncMappings::JiraProjectKey).text().null())
                    .col(
                        ColumnDef::new(SyncMappings::SyncEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SyncMappings::AutoSync)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SyncMappings::ConflictCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncMappings::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncMappings::LastModifiedLocal)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncMappings::LastModifiedRemote)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncMappings::BaseSnapshot).json_binary().null())
                    .col(
                        ColumnDef::new(SyncMappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncMappings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One Jira issue maps to at most one BRD, ever.
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_mappings_jira_key_unique")
                    .table(SyncMappings::Table)
                    .col(SyncMappings::JiraKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // BRD-side lookups (a BRD may legitimately pair with several issues).
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_mappings_brd_id")
                    .table(SyncMappings::Table)
                    .col(SyncMappings::BrdId)
                    .to_owned(),
            )
            .await?;

        // Covering index for the auto-sync webhook path using raw SQL so the
        // partial predicate works on both Postgres and SQLite.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_sync_mappings_auto_sync \
                 ON sync_mappings (jira_key) WHERE auto_sync AND sync_enabled"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_mappings_jira_key_unique")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_sync_mappings_brd_id").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_sync_mappings_auto_sync").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SyncMappings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncMappings {
    Table,
    Id,
    BrdId,
    JiraKey,
    JiraProjectKey,
    SyncEnabled,
    AutoSync,
    ConflictCount,
    LastSyncedAt,
    LastModifiedLocal,
    LastModifiedRemote,
    BaseSnapshot,
    CreatedAt,
    UpdatedAt,
}
