// ABOUTME: Applies the run's duplicate strategy to one batch of source rows
// ABOUTME: Issues the destination writes and reports inserted/updated/skipped deltas

use crate::config::DuplicateStrategy;
use crate::destination::Destination;
use crate::error::{MigrationError, Result};
use crate::retry::RetryPolicy;
use crate::value::{Row, Value, ID_COLUMN};
use std::ops::AddAssign;

/// Per-batch counters returned by every strategy handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchDelta {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl BatchDelta {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.skipped
    }
}

impl AddAssign for BatchDelta {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Write one batch to `table` according to `strategy`
///
/// UPDATE and APPEND retry the whole batch as one call; SKIP and ERROR retry
/// each per-row existence check and insert on its own.
pub async fn resolve_batch(
    destination: &dyn Destination,
    strategy: DuplicateStrategy,
    table: &str,
    rows: &[Row],
    policy: &RetryPolicy,
) -> Result<BatchDelta> {
    if rows.is_empty() {
        return Ok(BatchDelta::default());
    }
    match strategy {
        DuplicateStrategy::Update => update_batch(destination, table, rows, policy).await,
        DuplicateStrategy::Skip => skip_batch(destination, table, rows, policy).await,
        DuplicateStrategy::Error => error_batch(destination, table, rows, policy).await,
        DuplicateStrategy::Append => append_batch(destination, table, rows, policy).await,
    }
}

async fn update_batch(
    destination: &dyn Destination,
    table: &str,
    rows: &[Row],
    policy: &RetryPolicy,
) -> Result<BatchDelta> {
    let operation = format!("upsert into '{}'", table);
    policy
        .run(&operation, || destination.upsert(table, rows, ID_COLUMN))
        .await?;
    Ok(BatchDelta {
        updated: rows.len() as u64,
        ..BatchDelta::default()
    })
}

async fn skip_batch(
    destination: &dyn Destination,
    table: &str,
    rows: &[Row],
    policy: &RetryPolicy,
) -> Result<BatchDelta> {
    let mut delta = BatchDelta::default();
    for row in rows {
        let id = row_id(table, row)?;
        if row_exists(destination, table, id, policy).await? {
            delta.skipped += 1;
        } else {
            insert_row(destination, table, row, policy).await?;
            delta.inserted += 1;
        }
    }
    Ok(delta)
}

async fn error_batch(
    destination: &dyn Destination,
    table: &str,
    rows: &[Row],
    policy: &RetryPolicy,
) -> Result<BatchDelta> {
    // Every id is probed before the first insert, so a conflict writes nothing
    for row in rows {
        let id = row_id(table, row)?;
        if row_exists(destination, table, id, policy).await? {
            return Err(MigrationError::DuplicateData {
                table: table.to_string(),
                id: id.to_string(),
            });
        }
    }

    let mut delta = BatchDelta::default();
    for row in rows {
        insert_row(destination, table, row, policy).await?;
        delta.inserted += 1;
    }
    Ok(delta)
}

async fn append_batch(
    destination: &dyn Destination,
    table: &str,
    rows: &[Row],
    policy: &RetryPolicy,
) -> Result<BatchDelta> {
    let operation = format!("bulk insert into '{}'", table);
    policy
        .run(&operation, || destination.insert(table, rows))
        .await?;
    Ok(BatchDelta {
        inserted: rows.len() as u64,
        ..BatchDelta::default()
    })
}

fn row_id<'a>(table: &str, row: &'a Row) -> Result<&'a Value> {
    row.id().ok_or_else(|| MigrationError::MissingRowId {
        table: table.to_string(),
    })
}

async fn row_exists(
    destination: &dyn Destination,
    table: &str,
    id: &Value,
    policy: &RetryPolicy,
) -> Result<bool> {
    let operation = format!("existence check for id {} in '{}'", id, table);
    policy
        .run(&operation, || destination.exists(table, ID_COLUMN, id))
        .await
}

async fn insert_row(
    destination: &dyn Destination,
    table: &str,
    row: &Row,
    policy: &RetryPolicy,
) -> Result<()> {
    let operation = format!("insert into '{}'", table);
    policy
        .run(&operation, || destination.insert(table, std::slice::from_ref(row)))
        .await
}
