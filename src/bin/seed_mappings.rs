//! Seeds the field mapping registry with the default rules.
//!
//! Safe to run repeatedly; existing rules are left alone.

use anyhow::{Context, Result};
use clap::Parser;
use conductor_sync::{config::ConfigLoader, db, repositories::FieldMappingRepository, seeds};
use sea_orm_migration::MigratorTrait;

#[derive(Debug, Parser)]
#[command(name = "seed_mappings", about = "Seed the default field mapping rules")]
struct Args {
    /// List the rules that would be created without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Run pending migrations before seeding
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new();
    let config = loader.load().context("loading configuration")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    if args.migrate {
        migration::Migrator::up(&db, None)
            .await
            .context("running migrations")?;
    }

    if args.dry_run {
        let existing = FieldMappingRepository::new(db.clone())
            .list_all()
            .await
            .context("listing existing field mappings")?;
        println!("{} field mapping rules already present", existing.len());
        for rule in existing {
            println!(
                "  {} -> {} ({}, {})",
                rule.source_field,
                rule.target_field,
                rule.direction,
                rule.transform.as_deref().unwrap_or("direct")
            );
        }
        return Ok(());
    }

    let created = seeds::seed_field_mappings(&db)
        .await
        .context("seeding field mappings")?;
    println!("Created {} field mapping rules", created);

    Ok(())
}
