// ABOUTME: Migrates one table end-to-end from source to destination
// ABOUTME: Ensures schema, resumes from checkpoint, transfers batches, finalizes

use crate::checkpoint::ProgressStore;
use crate::config::TransferSettings;
use crate::destination::Destination;
use crate::error::{MigrationError, Result};
use crate::interactive::Confirmer;
use crate::migration::ddl::{materialize, render_realign_sequence, sequence_name};
use crate::migration::resolver::{resolve_batch, BatchDelta};
use crate::migration::schema::{inspect_table, TableStructure};
use crate::progress::ProgressObserver;
use crate::source::SourceDatabase;

/// Collaborators shared by every table of a run
pub struct MigrationContext<'a> {
    pub source: &'a dyn SourceDatabase,
    pub destination: &'a dyn Destination,
    pub store: &'a ProgressStore,
    pub confirmer: &'a dyn Confirmer,
    pub progress: &'a dyn ProgressObserver,
    pub settings: &'a TransferSettings,
}

/// Counters for one successfully migrated table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub table: String,
    pub updated: u64,
    pub inserted: u64,
    pub skipped: u64,
    /// Source row count at the start of the transfer
    pub total: u64,
    /// Offset the transfer started from (non-zero after a resume)
    pub resumed_from: u64,
    /// Whether the destination table was created by this run
    pub created: bool,
}

/// Migrate `table` completely, or fail leaving its checkpoint in place
///
/// Batches are fetched in `id` order with LIMIT/OFFSET from the resume
/// position. Each batch runs through the duplicate resolver under the batch
/// timeout; the checkpoint is written only after the batch commits, so a
/// failed batch is retried from its own offset on the next run.
pub async fn migrate_table(ctx: &MigrationContext<'_>, table: &str) -> Result<TableOutcome> {
    tracing::info!(table, strategy = %ctx.settings.strategy, "Migrating table");

    let created_structure = ensure_schema(ctx, table).await?;

    let total = ctx
        .source
        .count_rows(table)
        .await
        .map_err(|e| MigrationError::source_query(table, e))?;
    let start = resume_position(ctx, table, total).await?;

    ctx.progress.start(table, total, start);
    let delta = match transfer(ctx, table, start, total).await {
        Ok(delta) => delta,
        Err(err) => {
            ctx.progress.abandon();
            tracing::error!(table, error = %err, "✗ Table migration failed; checkpoint kept for resume");
            return Err(err);
        }
    };
    ctx.progress.finish();
    ctx.store.clear(table);

    if let Some(structure) = &created_structure {
        realign_sequences(ctx.destination, table, structure).await;
    }

    let outcome = TableOutcome {
        table: table.to_string(),
        updated: delta.updated,
        inserted: delta.inserted,
        skipped: delta.skipped,
        total,
        resumed_from: start,
        created: created_structure.is_some(),
    };
    tracing::info!(
        table,
        updated = outcome.updated,
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        total = outcome.total,
        "✓ Table migrated"
    );
    Ok(outcome)
}

/// Create the destination table when a bounded read reports it missing
///
/// Returns the structure that was materialized, or `None` when the table
/// already existed.
async fn ensure_schema(ctx: &MigrationContext<'_>, table: &str) -> Result<Option<TableStructure>> {
    match ctx.destination.select(table, 1).await {
        Ok(_) => {
            tracing::debug!(table, "Destination table exists");
            Ok(None)
        }
        Err(err) if err.is_relation_missing() => {
            tracing::info!(table, "Destination table missing, creating it from source schema");
            let structure = inspect_table(ctx.source, table).await?;
            if let Err(err) = materialize(ctx.destination, table, &structure).await {
                tracing::error!(table, error = %err, "✗ Failed to create destination table");
                return Err(err);
            }
            tracing::info!(
                table,
                columns = structure.columns.len(),
                sequences = structure.sequences.len(),
                "✓ Destination table created"
            );
            Ok(Some(structure))
        }
        Err(err) => Err(MigrationError::Destination {
            operation: format!("existence check of '{}'", table),
            source: err,
        }),
    }
}

/// Offset to start from: a confirmed checkpoint cursor, else 0
async fn resume_position(ctx: &MigrationContext<'_>, table: &str, total: u64) -> Result<u64> {
    let Some(checkpoint) = ctx.store.load(table) else {
        return Ok(0);
    };
    if checkpoint.table_name != table || checkpoint.cursor == 0 {
        return Ok(0);
    }

    let cursor = checkpoint.cursor.min(total);
    if cursor < checkpoint.cursor {
        tracing::warn!(
            table,
            saved = checkpoint.cursor,
            total,
            "Checkpoint is past the current row count, clamping"
        );
    }

    let question = format!(
        "Found saved progress for '{}' at row {} of {} (saved {}). Resume from there?",
        table,
        cursor,
        total,
        checkpoint.timestamp.to_rfc3339()
    );
    let resume = ctx
        .confirmer
        .confirm(&question)
        .await
        .map_err(MigrationError::Prompt)?;

    if resume {
        tracing::info!(table, cursor, total, "Resuming from checkpoint");
        Ok(cursor)
    } else {
        tracing::info!(table, "Restarting from the first row");
        Ok(0)
    }
}

async fn transfer(
    ctx: &MigrationContext<'_>,
    table: &str,
    start: u64,
    total: u64,
) -> Result<BatchDelta> {
    let settings = ctx.settings;
    let policy = settings.retry_policy();
    let mut delta = BatchDelta::default();
    let mut offset = start;

    while offset < total {
        let rows = ctx
            .source
            .fetch_batch(table, settings.batch_size, offset)
            .await
            .map_err(|e| MigrationError::source_query(table, e))?;
        if rows.is_empty() {
            tracing::warn!(
                table,
                offset,
                total,
                "Source returned no rows before the expected count; ending transfer"
            );
            break;
        }

        let batch_delta = policy
            .within_batch_timeout(
                table,
                offset,
                resolve_batch(ctx.destination, settings.strategy, table, &rows, &policy),
            )
            .await?;
        delta += batch_delta;

        offset = (offset + rows.len() as u64).min(total);
        ctx.progress.advance(offset);
        ctx.store
            .save(table, offset, total)
            .map_err(|source| MigrationError::Checkpoint {
                table: table.to_string(),
                source,
            })?;
        tracing::debug!(
            table,
            offset,
            total,
            inserted = batch_delta.inserted,
            updated = batch_delta.updated,
            skipped = batch_delta.skipped,
            "Batch committed"
        );
    }

    Ok(delta)
}

/// Move each created sequence past the migrated maximum; failures only warn
async fn realign_sequences(destination: &dyn Destination, table: &str, structure: &TableStructure) {
    for sequence in &structure.sequences {
        let name = sequence_name(table, &sequence.column);
        match destination
            .execute_sql(&render_realign_sequence(table, sequence))
            .await
        {
            Ok(()) => tracing::debug!(table, sequence = %name, "Sequence realigned"),
            Err(err) => tracing::warn!(
                table,
                sequence = %name,
                error = %err,
                "Failed to realign sequence; new inserts may collide with migrated ids"
            ),
        }
    }
}
