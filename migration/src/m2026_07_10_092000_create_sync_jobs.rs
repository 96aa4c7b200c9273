//! Migration to create the sync_jobs table.
//!
//! Sync jobs are the durable queue entries for import, export, bulk, resync,
//! and webhook-triggered operations, tracked through a forward-only status
//! state machine with retry bookkeeping and item-level progress counters.

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
                    .table(SyncJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncJobs::Direction).text().not_null())
                    .col(ColumnDef::new(SyncJobs::Operation).text().not_null())
                    .col(
                        ColumnDef::new(SyncJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(SyncJobs::MappingId).uuid().null())
                    .col(ColumnDef::new(SyncJobs::BrdId).text().null())
                    .col(ColumnDef::new(SyncJobs::JiraKey).text().null())
                    .col(ColumnDef::new(SyncJobs::ProjectKey).text().null())
                    .col(ColumnDef::new(SyncJobs::Payload).json_binary().null())
                    .col(
                        ColumnDef::new(SyncJobs::Progress)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::TotalItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::ProcessedItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::FailedItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncJobs::ItemFailures).json_binary().null())
                    .col(
                        ColumnDef::new(SyncJobs::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::RunAfter)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::CancelRequested)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(SyncJobs::ParentJobId).uuid().null())
                    .col(ColumnDef::new(SyncJobs::Error).json_binary().null())
                    .col(
                        ColumnDef::new(SyncJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Claim-order index: runnable jobs are picked FIFO by creation time.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_sync_jobs_status_run_after_created \
                 ON sync_jobs (status, run_after, created_at)"
                    .to_string(),
            ))
            .await?;

        // Per-mapping serialization checks and mapping history views.
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_mapping_status")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::MappingId)
                    .col(SyncJobs::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_jobs_status_run_after_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_sync_jobs_mapping_status").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SyncJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncJobs {
    Table,
    Id,
    Direction,
    Operation,
    Status,
    MappingId,
    BrdId,
    JiraKey,
    ProjectKey,
    Payload,
    Progress,
    TotalItems,
    ProcessedItems,
    FailedItems,
    ItemFailures,
    RetryCount,
    MaxRetries,
    RunAfter,
    CancelRequested,
    ParentJobId,
    Error,
    CreatedAt,
    StartedAt,
    FinishedAt,
    UpdatedAt,
}
