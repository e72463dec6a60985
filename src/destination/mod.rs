// ABOUTME: Tabular read/write/upsert interface to the destination store
// ABOUTME: Includes the out-of-band DDL capability used for schema creation

pub mod supabase;

pub use supabase::SupabaseClient;

use crate::error::DestinationError;
use crate::value::{Row, Value};
use async_trait::async_trait;

pub type DestinationResult<T> = std::result::Result<T, DestinationError>;

/// Destination store addressed table by table
#[async_trait]
pub trait Destination: Send + Sync {
    /// Prove the endpoint and credential are usable
    async fn ping(&self) -> DestinationResult<()>;

    /// Read up to `limit` rows; a missing table reports a relation-missing code
    async fn select(&self, table: &str, limit: usize) -> DestinationResult<Vec<serde_json::Value>>;

    /// Whether a row with `key_column = key` exists
    async fn exists(&self, table: &str, key_column: &str, key: &Value) -> DestinationResult<bool>;

    /// Insert-or-replace `rows`, resolving conflicts on `conflict_key`
    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> DestinationResult<()>;

    async fn insert(&self, table: &str, rows: &[Row]) -> DestinationResult<()>;

    /// Execute arbitrary DDL
    async fn execute_sql(&self, sql: &str) -> DestinationResult<()>;
}
