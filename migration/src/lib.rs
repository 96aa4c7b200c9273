//! Database migrations for the Conductor Sync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_07_10_090000_create_sync_mappings;
mod m2026_07_10_091000_create_field_mappings;
mod m2026_07_10_092000_create_sync_jobs;
mod m2026_07_10_093000_create_sync_conflicts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_07_10_090000_create_sync_mappings::Migration),
            Box::new(m2026_07_10_091000_create_field_mappings::Migration),
            Box::new(m2026_07_10_092000_create_sync_jobs::Migration),
            Box::new(m2026_07_10_093000_create_sync_conflicts::Migration),
        ]
    }
}
