// ABOUTME: Read-only interface to the relational source database
// ABOUTME: Catalog lookups, row counts, and id-ordered paginated batch reads

use crate::migration::schema::{ColumnSpec, ForeignKeySpec, SequenceSpec, TableDescriptor};
use crate::value::Row;
use anyhow::Result;
use async_trait::async_trait;

/// Source store queried through SQL
///
/// Implementations are shared read-only for the whole run.
#[async_trait]
pub trait SourceDatabase: Send + Sync {
    /// Round-trip a trivial query to prove the connection works
    async fn ping(&self) -> Result<()>;

    /// Base tables of the configured schema, in discovery order
    async fn list_base_tables(&self) -> Result<Vec<TableDescriptor>>;

    /// Columns ordered by declaration position
    async fn columns(&self, table: &str) -> Result<Vec<ColumnSpec>>;

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeySpec>>;

    /// Columns whose default draws from a sequence generator
    async fn sequence_columns(&self, table: &str) -> Result<Vec<SequenceSpec>>;

    async fn count_rows(&self, table: &str) -> Result<u64>;

    /// Up to `limit` rows ordered by `id` ascending, skipping the first `offset`
    async fn fetch_batch(&self, table: &str, limit: u64, offset: u64) -> Result<Vec<Row>>;
}
