// ABOUTME: Renders inspected table structures as destination DDL and submits it
// ABOUTME: Creates tables idempotently, then attaches sequence-backed defaults

use crate::destination::Destination;
use crate::error::{DestinationError, MigrationError, Result};
use crate::migration::schema::{ColumnSpec, SequenceSpec, TableStructure};
use crate::utils::{quote_ident, quote_literal};

/// Deterministic sequence name for a table column
pub fn sequence_name(table: &str, column: &str) -> String {
    format!("{}_{}_seq", table, column)
}

/// Column type with declared character length folded into the name
fn render_type(column: &ColumnSpec) -> String {
    match (column.data_type.as_str(), column.max_length) {
        ("character varying", Some(len)) => format!("varchar({})", len),
        ("character", Some(len)) => format!("char({})", len),
        ("ARRAY", _) => {
            let element = column.udt_name.trim_start_matches('_');
            format!("{}[]", element)
        }
        ("USER-DEFINED", _) => quote_ident(&column.udt_name),
        (data_type, _) => data_type.to_string(),
    }
}

fn render_column(column: &ColumnSpec) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), render_type(column));
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    // Sequence defaults are attached after the sequence exists
    if let Some(default) = column.default_expr.as_deref() {
        if !column.has_sequence_default() {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
    }
    def
}

/// Build the `CREATE TABLE IF NOT EXISTS` statement for `table`
pub fn render_create_table(table: &str, structure: &TableStructure) -> String {
    let mut definitions: Vec<String> = structure.columns.iter().map(render_column).collect();

    if !structure.keys.primary_keys.is_empty() {
        let keys: Vec<String> = structure
            .keys
            .primary_keys
            .iter()
            .map(|k| quote_ident(k))
            .collect();
        definitions.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    for fk in &structure.keys.foreign_keys {
        definitions.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(&fk.column),
            quote_ident(&fk.foreign_table),
            quote_ident(&fk.foreign_column)
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote_ident(table),
        definitions.join(",\n  ")
    )
}

pub fn render_create_sequence(table: &str, sequence: &SequenceSpec) -> String {
    format!(
        "CREATE SEQUENCE IF NOT EXISTS {} START WITH 1 INCREMENT BY 1 NO MINVALUE NO MAXVALUE CACHE 1",
        quote_ident(&sequence_name(table, &sequence.column))
    )
}

pub fn render_attach_sequence(table: &str, sequence: &SequenceSpec) -> String {
    let seq = quote_ident(&sequence_name(table, &sequence.column));
    format!(
        "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT nextval({})",
        quote_ident(table),
        quote_ident(&sequence.column),
        quote_literal(&seq)
    )
}

/// Move a sequence past the largest value already stored in its column
pub fn render_realign_sequence(table: &str, sequence: &SequenceSpec) -> String {
    let seq = quote_ident(&sequence_name(table, &sequence.column));
    format!(
        "SELECT setval({}, COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
        quote_literal(&seq),
        quote_ident(&sequence.column),
        quote_ident(table)
    )
}

/// Create `table` and its sequences in the destination
///
/// Stops at the first rejected statement; later sequences are not attempted.
pub async fn materialize(
    destination: &dyn Destination,
    table: &str,
    structure: &TableStructure,
) -> Result<()> {
    let ddl_error = |source: DestinationError| MigrationError::DdlExecution {
        table: table.to_string(),
        source,
    };

    let create_table = render_create_table(table, structure);
    tracing::debug!(table, sql = %create_table, "Creating destination table");
    destination
        .execute_sql(&create_table)
        .await
        .map_err(ddl_error)?;

    for sequence in &structure.sequences {
        let name = sequence_name(table, &sequence.column);
        tracing::debug!(table, sequence = %name, "Creating sequence");
        destination
            .execute_sql(&render_create_sequence(table, sequence))
            .await
            .map_err(ddl_error)?;
        destination
            .execute_sql(&render_attach_sequence(table, sequence))
            .await
            .map_err(ddl_error)?;
    }

    Ok(())
}
