// ABOUTME: Error taxonomy for table migrations
// ABOUTME: Separates fatal run errors, per-table failures, and destination rejections

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// PostgreSQL SQLSTATE for "relation does not exist"
pub const RELATION_MISSING_CODE: &str = "42P01";

/// PostgREST code returned when a table is absent from its schema cache
pub const SCHEMA_CACHE_MISSING_CODE: &str = "PGRST205";

/// Failure reported by the destination store
///
/// Carries the HTTP status (when the request reached the server) and the
/// machine-readable error code from the response body, if one was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl DestinationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// True when the destination reports that the addressed table does not exist
    pub fn is_relation_missing(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some(RELATION_MISSING_CODE) | Some(SCHEMA_CACHE_MISSING_CODE)
        )
    }

    /// True for failures worth retrying: transport errors, timeouts, throttling and 5xx
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == 408 || status == 429 || status >= 500,
        }
    }
}

impl fmt::Display for DestinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code {})", code)?;
        }
        if let Some(status) = self.status {
            write!(f, " [HTTP {}]", status)?;
        }
        Ok(())
    }
}

impl std::error::Error for DestinationError {}

/// Error kinds surfaced by the migration engine
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Connectivity check failed for {store}: {message}")]
    Connectivity { store: &'static str, message: String },

    #[error("Failed to read schema metadata for table '{table}': {source}")]
    SchemaQuery {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Destination rejected DDL for table '{table}': {source}")]
    DdlExecution {
        table: String,
        #[source]
        source: DestinationError,
    },

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    OperationFailed {
        operation: String,
        attempts: u32,
        #[source]
        source: DestinationError,
    },

    #[error("Batch at offset {offset} of table '{table}' did not finish within {timeout:?}")]
    BatchTimeout {
        table: String,
        offset: u64,
        timeout: Duration,
    },

    #[error("Duplicate row found in table '{table}': id {id}")]
    DuplicateData { table: String, id: String },

    #[error("Row in table '{table}' has no 'id' column; SKIP and ERROR strategies need one")]
    MissingRowId { table: String },

    #[error("Source query failed for table '{table}': {source}")]
    SourceQuery {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} rejected by destination: {source}")]
    Destination {
        operation: String,
        #[source]
        source: DestinationError,
    },

    #[error("Failed to write progress checkpoint for table '{table}': {source}")]
    Checkpoint {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Interactive confirmation failed: {0}")]
    Prompt(#[source] anyhow::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MigrationError {
    pub fn schema_query(table: impl Into<String>, source: anyhow::Error) -> Self {
        MigrationError::SchemaQuery {
            table: table.into(),
            source,
        }
    }

    pub fn source_query(table: impl Into<String>, source: anyhow::Error) -> Self {
        MigrationError::SourceQuery {
            table: table.into(),
            source,
        }
    }

    /// Whether the failure aborts the whole run before any table is attempted
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            MigrationError::Connectivity { .. } | MigrationError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
