// ABOUTME: Check command implementation
// ABOUTME: Verifies both stores are reachable and lists the tables a run would migrate

use crate::config::MigrationConfig;
use crate::filters::TableFilter;
use crate::migration::{check_connectivity, discover_tables};
use anyhow::Result;

/// Run the pre-migration connectivity checks without transferring data
pub async fn check(config: &MigrationConfig, filter: &TableFilter) -> Result<()> {
    let (source, destination) = super::open_stores(config).await?;
    check_connectivity(&source, &destination).await?;

    let tables = discover_tables(&source, filter).await?;
    println!();
    println!("Source and destination are reachable.");
    println!(
        "{} table(s) in schema '{}' would be migrated:",
        tables.len(),
        config.source.schema
    );
    for table in &tables {
        println!("  - {}", table.name);
    }
    println!();
    Ok(())
}
