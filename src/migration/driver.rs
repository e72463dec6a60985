// ABOUTME: Runs a whole migration: connectivity checks, discovery, per-table transfer
// ABOUTME: Tables are migrated sequentially and the first failure ends the run

use crate::destination::Destination;
use crate::error::MigrationError;
use crate::filters::TableFilter;
use crate::migration::schema::TableDescriptor;
use crate::migration::table::{migrate_table, MigrationContext, TableOutcome};
use crate::source::SourceDatabase;
use thiserror::Error;

/// Outcomes of every table migrated in a run, in migration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tables: Vec<TableOutcome>,
}

impl RunSummary {
    pub fn updated(&self) -> u64 {
        self.tables.iter().map(|t| t.updated).sum()
    }

    pub fn inserted(&self) -> u64 {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.tables.iter().map(|t| t.skipped).sum()
    }

    pub fn total(&self) -> u64 {
        self.tables.iter().map(|t| t.total).sum()
    }
}

/// Terminal error of a run
#[derive(Debug, Error)]
pub enum RunError {
    /// Failed before any table was attempted
    #[error(transparent)]
    Setup(MigrationError),

    /// A table failed; `completed` holds the tables finished before it
    #[error("Migration of table '{table}' failed: {source}")]
    Table {
        table: String,
        completed: RunSummary,
        #[source]
        source: MigrationError,
    },
}

impl RunError {
    pub fn migration_error(&self) -> &MigrationError {
        match self {
            RunError::Setup(err) => err,
            RunError::Table { source, .. } => source,
        }
    }
}

/// Prove both stores are reachable
pub async fn check_connectivity(
    source: &dyn SourceDatabase,
    destination: &dyn Destination,
) -> Result<(), MigrationError> {
    source
        .ping()
        .await
        .map_err(|e| {
            tracing::error!(error = %format!("{:#}", e), "✗ Source database unreachable");
            MigrationError::Connectivity {
                store: "source",
                message: format!("{:#}", e),
            }
        })?;
    tracing::info!("✓ Source database reachable");

    destination
        .ping()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "✗ Destination unreachable");
            MigrationError::Connectivity {
                store: "destination",
                message: e.to_string(),
            }
        })?;
    tracing::info!("✓ Destination reachable");
    Ok(())
}

/// Base tables the run will migrate, in discovery order
pub async fn discover_tables(
    source: &dyn SourceDatabase,
    filter: &TableFilter,
) -> Result<Vec<TableDescriptor>, MigrationError> {
    let all = source
        .list_base_tables()
        .await
        .map_err(|e| MigrationError::source_query("information_schema.tables", e))?;
    let discovered = all.len();
    let selected = filter.apply(all);
    if !filter.is_empty() {
        tracing::info!(
            discovered,
            selected = selected.len(),
            "Applied table filter"
        );
    }
    Ok(selected)
}

/// Migrate every selected table of the source
///
/// # Errors
///
/// `RunError::Setup` for connectivity or discovery failures; otherwise
/// `RunError::Table` naming the first table that failed. Tables after it are
/// not attempted.
pub async fn run_migration(
    ctx: &MigrationContext<'_>,
    filter: &TableFilter,
) -> Result<RunSummary, RunError> {
    check_connectivity(ctx.source, ctx.destination)
        .await
        .map_err(RunError::Setup)?;

    let tables = discover_tables(ctx.source, filter)
        .await
        .map_err(RunError::Setup)?;
    if tables.is_empty() {
        tracing::warn!("⚠ No tables to migrate");
    } else {
        tracing::info!("Found {} table(s) to migrate", tables.len());
    }

    let mut summary = RunSummary::default();
    for table in &tables {
        match migrate_table(ctx, &table.name).await {
            Ok(outcome) => summary.tables.push(outcome),
            Err(source) => {
                return Err(RunError::Table {
                    table: table.name.clone(),
                    completed: summary,
                    source,
                });
            }
        }
    }

    tracing::info!(
        tables = summary.tables.len(),
        updated = summary.updated(),
        inserted = summary.inserted(),
        skipped = summary.skipped(),
        total = summary.total(),
        "✓ Migration complete"
    );
    Ok(summary)
}
