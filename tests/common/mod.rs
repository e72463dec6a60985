// ABOUTME: In-memory source and destination doubles for migration integration tests
// ABOUTME: Knobs simulate missing tables, rejected DDL, failing lookups, hung writes, and outages

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use supabase_table_migrator::checkpoint::ProgressStore;
use supabase_table_migrator::config::{DuplicateStrategy, TransferSettings};
use supabase_table_migrator::destination::{Destination, DestinationResult};
use supabase_table_migrator::error::DestinationError;
use supabase_table_migrator::interactive::Confirmer;
use supabase_table_migrator::migration::schema::{
    ColumnSpec, ForeignKeySpec, KeySpec, SequenceSpec, TableDescriptor, TableStructure,
};
use supabase_table_migrator::migration::MigrationContext;
use supabase_table_migrator::progress::ProgressObserver;
use supabase_table_migrator::source::SourceDatabase;
use supabase_table_migrator::value::{Row, Value};
use tempfile::TempDir;

pub fn user_row(id: i64) -> Row {
    Row::new()
        .with("id", Value::Int(id))
        .with("name", Value::Text(format!("user{}", id)))
        .with("email", Value::Text(format!("user{}@example.com", id)))
}

pub fn users(count: i64) -> Vec<Row> {
    (1..=count).map(user_row).collect()
}

pub fn users_structure() -> TableStructure {
    TableStructure {
        columns: vec![
            ColumnSpec {
                name: "id".into(),
                data_type: "integer".into(),
                udt_name: "int4".into(),
                nullable: false,
                default_expr: Some("nextval('users_id_seq'::regclass)".into()),
                max_length: None,
            },
            ColumnSpec {
                name: "name".into(),
                data_type: "character varying".into(),
                udt_name: "varchar".into(),
                nullable: false,
                default_expr: None,
                max_length: Some(100),
            },
            ColumnSpec {
                name: "email".into(),
                data_type: "text".into(),
                udt_name: "text".into(),
                nullable: true,
                default_expr: None,
                max_length: None,
            },
        ],
        keys: KeySpec {
            primary_keys: vec!["id".into()],
            foreign_keys: Vec::<ForeignKeySpec>::new(),
        },
        sequences: vec![SequenceSpec {
            column: "id".into(),
            default_expr: "nextval('users_id_seq'::regclass)".into(),
        }],
    }
}

struct SourceTable {
    structure: TableStructure,
    rows: Vec<Row>,
}

/// Source database held in memory; rows are served in insertion order
#[derive(Default)]
pub struct MemorySource {
    tables: BTreeMap<String, SourceTable>,
    ping_fails: bool,
    /// Catalog lookup (`columns`, `primary_keys`, `foreign_keys`, `sequence_columns`) that errors
    failing_query: Option<&'static str>,
    fetches: Mutex<Vec<(String, u64, u64)>>,
}

impl MemorySource {
    pub fn unreachable(mut self) -> Self {
        self.ping_fails = true;
        self
    }

    pub fn failing_query(mut self, query: &'static str) -> Self {
        self.failing_query = Some(query);
        self
    }

    pub fn with_table(mut self, name: &str, structure: TableStructure, rows: Vec<Row>) -> Self {
        self.tables
            .insert(name.to_string(), SourceTable { structure, rows });
        self
    }

    pub fn fetch_offsets(&self, table: &str) -> Vec<u64> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == table)
            .map(|(_, _, offset)| *offset)
            .collect()
    }

    fn catalog(&self, query: &str, name: &str) -> anyhow::Result<&TableStructure> {
        if self.failing_query == Some(query) {
            anyhow::bail!("permission denied for view {}", query);
        }
        Ok(&self.table(name)?.structure)
    }

    fn table(&self, name: &str) -> anyhow::Result<&SourceTable> {
        self.tables
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("relation \"{}\" does not exist", name))
    }
}

#[async_trait]
impl SourceDatabase for MemorySource {
    async fn ping(&self) -> anyhow::Result<()> {
        if self.ping_fails {
            anyhow::bail!("Connection refused");
        }
        Ok(())
    }

    async fn list_base_tables(&self) -> anyhow::Result<Vec<TableDescriptor>> {
        Ok(self.tables.keys().map(TableDescriptor::new).collect())
    }

    async fn columns(&self, table: &str) -> anyhow::Result<Vec<ColumnSpec>> {
        Ok(self.catalog("columns", table)?.columns.clone())
    }

    async fn primary_keys(&self, table: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.catalog("primary_keys", table)?.keys.primary_keys.clone())
    }

    async fn foreign_keys(&self, table: &str) -> anyhow::Result<Vec<ForeignKeySpec>> {
        Ok(self.catalog("foreign_keys", table)?.keys.foreign_keys.clone())
    }

    async fn sequence_columns(&self, table: &str) -> anyhow::Result<Vec<SequenceSpec>> {
        Ok(self.catalog("sequence_columns", table)?.sequences.clone())
    }

    async fn count_rows(&self, table: &str) -> anyhow::Result<u64> {
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn fetch_batch(&self, table: &str, limit: u64, offset: u64) -> anyhow::Result<Vec<Row>> {
        self.fetches
            .lock()
            .unwrap()
            .push((table.to_string(), limit, offset));
        let rows = &self.table(table)?.rows;
        Ok(rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

fn relation_missing(table: &str) -> DestinationError {
    DestinationError::new(format!("relation \"public.{}\" does not exist", table))
        .with_status(404)
        .with_code("42P01")
}

fn id_key(row: &Row) -> Option<String> {
    row.id().map(|id| id.to_string())
}

/// Destination held in memory
///
/// Tables must exist (preloaded or created through `execute_sql`) before
/// rows can be written.
#[derive(Default)]
pub struct MemoryDestination {
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
    executed_sql: Mutex<Vec<String>>,
    ping_fails: bool,
    /// Error code returned by every `select`, standing in for a failed existence check
    select_error: Option<&'static str>,
    /// Statements starting with this prefix are rejected by `execute_sql`
    rejected_sql: Option<&'static str>,
    /// Write calls (upsert/insert) that succeed before every later write hangs
    hang_after_writes: Option<usize>,
    /// Number of leading write calls that fail with a transient error
    transient_write_failures: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryDestination {
    pub fn unreachable(mut self) -> Self {
        self.ping_fails = true;
        self
    }

    pub fn failing_select(mut self, code: &'static str) -> Self {
        self.select_error = Some(code);
        self
    }

    pub fn rejecting_sql(mut self, prefix: &'static str) -> Self {
        self.rejected_sql = Some(prefix);
        self
    }

    pub fn hanging_after(mut self, writes: usize) -> Self {
        self.hang_after_writes = Some(writes);
        self
    }

    pub fn failing_transiently(self, failures: usize) -> Self {
        self.transient_write_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed_sql.lock().unwrap().clone()
    }

    pub fn with_table(self, name: &str, rows: Vec<Row>) -> Self {
        self.tables.lock().unwrap().insert(name.to_string(), rows);
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.lock().unwrap().contains_key(table)
    }

    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn should_hang(&self) -> bool {
        let completed = self.writes.load(Ordering::SeqCst);
        matches!(self.hang_after_writes, Some(limit) if completed >= limit)
    }

    fn take_transient_failure(&self) -> bool {
        self.transient_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn before_write(&self) -> DestinationResult<()> {
        if self.should_hang() {
            std::future::pending::<()>().await;
        }
        if self.take_transient_failure() {
            return Err(DestinationError::new("connection reset by peer"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn ping(&self) -> DestinationResult<()> {
        if self.ping_fails {
            return Err(DestinationError::new("Invalid API key").with_status(401));
        }
        Ok(())
    }

    async fn select(&self, table: &str, limit: usize) -> DestinationResult<Vec<serde_json::Value>> {
        if let Some(code) = self.select_error {
            return Err(DestinationError::new("JWT expired")
                .with_status(401)
                .with_code(code));
        }
        let tables = self.tables.lock().unwrap();
        let rows = tables.get(table).ok_or_else(|| relation_missing(table))?;
        Ok(rows
            .iter()
            .take(limit)
            .map(|r| serde_json::to_value(r).unwrap())
            .collect())
    }

    async fn exists(&self, table: &str, _key_column: &str, key: &Value) -> DestinationResult<bool> {
        let tables = self.tables.lock().unwrap();
        let rows = tables.get(table).ok_or_else(|| relation_missing(table))?;
        let wanted = key.to_string();
        Ok(rows.iter().any(|r| id_key(r).as_deref() == Some(wanted.as_str())))
    }

    async fn upsert(&self, table: &str, rows: &[Row], _conflict_key: &str) -> DestinationResult<()> {
        self.before_write().await?;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.get_mut(table).ok_or_else(|| relation_missing(table))?;
        for row in rows {
            let key = id_key(row);
            match stored.iter_mut().find(|r| id_key(r) == key) {
                Some(existing) => *existing = row.clone(),
                None => stored.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> DestinationResult<()> {
        self.before_write().await?;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.get_mut(table).ok_or_else(|| relation_missing(table))?;
        stored.extend(rows.iter().cloned());
        Ok(())
    }

    async fn execute_sql(&self, sql: &str) -> DestinationResult<()> {
        self.executed_sql.lock().unwrap().push(sql.to_string());
        if matches!(self.rejected_sql, Some(prefix) if sql.starts_with(prefix)) {
            return Err(DestinationError::new("permission denied for schema public")
                .with_status(400)
                .with_code("42501"));
        }
        if let Some(rest) = sql.strip_prefix("CREATE TABLE IF NOT EXISTS \"") {
            if let Some(end) = rest.find('"') {
                self.tables
                    .lock()
                    .unwrap()
                    .entry(rest[..end].to_string())
                    .or_default();
            }
        }
        Ok(())
    }
}

/// Confirmer with a fixed answer that records the questions asked
pub struct ScriptedConfirm {
    pub answer: bool,
    pub questions: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> usize {
        self.questions.lock().unwrap().len()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirm {
    async fn confirm(&self, question: &str) -> anyhow::Result<bool> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(self.answer)
    }
}

/// Records every position reported by the migrator
#[derive(Default)]
pub struct RecordingProgress {
    pub starts: Mutex<Vec<(String, u64, u64)>>,
    pub positions: Mutex<Vec<u64>>,
    pub finished: AtomicUsize,
    pub abandoned: AtomicUsize,
}

impl ProgressObserver for RecordingProgress {
    fn start(&self, table: &str, total: u64, position: u64) {
        self.starts
            .lock()
            .unwrap()
            .push((table.to_string(), total, position));
    }

    fn advance(&self, position: u64) {
        self.positions.lock().unwrap().push(position);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn abandon(&self) {
        self.abandoned.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn settings(strategy: DuplicateStrategy, batch_size: u64) -> TransferSettings {
    TransferSettings {
        strategy,
        batch_size,
        max_retries: 3,
        retry_delay: Duration::from_millis(1),
        batch_timeout: Duration::from_secs(5),
    }
}

/// Everything a test needs besides the source and destination
pub struct Harness {
    pub dir: TempDir,
    pub store: ProgressStore,
    pub confirm: ScriptedConfirm,
    pub progress: RecordingProgress,
    pub settings: TransferSettings,
}

impl Harness {
    pub fn new(settings: TransferSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        Self {
            dir,
            store,
            confirm: ScriptedConfirm::new(true),
            progress: RecordingProgress::default(),
            settings,
        }
    }

    pub fn context<'a>(
        &'a self,
        source: &'a MemorySource,
        destination: &'a MemoryDestination,
    ) -> MigrationContext<'a> {
        MigrationContext {
            source,
            destination,
            store: &self.store,
            confirmer: &self.confirm,
            progress: &self.progress,
            settings: &self.settings,
        }
    }
}
