// ABOUTME: Table structure model and source schema inspection
// ABOUTME: Collects columns, keys, and sequence-backed defaults for one table

use crate::error::{MigrationError, Result};
use crate::source::SourceDatabase;

/// A table discovered in the source catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    /// `information_schema.columns.data_type`, e.g. `integer`, `character varying`, `ARRAY`
    pub data_type: String,
    /// Underlying type name, e.g. `int4`, `_text`, or a user-defined enum name
    pub udt_name: String,
    pub nullable: bool,
    pub default_expr: Option<String>,
    pub max_length: Option<i32>,
}

impl ColumnSpec {
    /// Whether the default draws from a sequence generator
    pub fn has_sequence_default(&self) -> bool {
        self.default_expr
            .as_deref()
            .map(is_sequence_default)
            .unwrap_or(false)
    }
}

/// True when a column default expression calls a sequence generator
pub fn is_sequence_default(expr: &str) -> bool {
    expr.contains("nextval(")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpec {
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSpec {
    pub column: String,
    pub default_expr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStructure {
    pub columns: Vec<ColumnSpec>,
    pub keys: KeySpec,
    pub sequences: Vec<SequenceSpec>,
}

/// Read the full structure of `table` from the source catalog
///
/// All four metadata lookups must succeed; any failure yields
/// `SchemaQuery` and no partial structure is returned.
pub async fn inspect_table(source: &dyn SourceDatabase, table: &str) -> Result<TableStructure> {
    tracing::debug!(table, "Inspecting source table structure");

    let (columns, primary_keys, foreign_keys, sequences) = futures::try_join!(
        source.columns(table),
        source.primary_keys(table),
        source.foreign_keys(table),
        source.sequence_columns(table),
    )
    .map_err(|e| MigrationError::schema_query(table, e))?;

    if columns.is_empty() {
        return Err(MigrationError::schema_query(
            table,
            anyhow::anyhow!("no columns found in the source catalog"),
        ));
    }

    tracing::debug!(
        table,
        columns = columns.len(),
        primary_keys = primary_keys.len(),
        foreign_keys = foreign_keys.len(),
        sequences = sequences.len(),
        "Source table structure loaded"
    );

    Ok(TableStructure {
        columns,
        keys: KeySpec {
            primary_keys,
            foreign_keys,
        },
        sequences,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sequence_defaults() {
        assert!(is_sequence_default("nextval('users_id_seq'::regclass)"));
        assert!(!is_sequence_default("now()"));
        assert!(!is_sequence_default("'nextval'::text"));
    }

    #[test]
    fn column_sequence_default_flag() {
        let column = ColumnSpec {
            name: "id".into(),
            data_type: "integer".into(),
            udt_name: "int4".into(),
            nullable: false,
            default_expr: Some("nextval('users_id_seq'::regclass)".into()),
            max_length: None,
        };
        assert!(column.has_sequence_default());

        let plain = ColumnSpec {
            default_expr: None,
            ..column
        };
        assert!(!plain.has_sequence_default());
    }
}
