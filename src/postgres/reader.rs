// ABOUTME: PostgreSQL implementation of the migration source
// ABOUTME: Catalog queries, row counts, paginated reads, and column value decoding

use crate::migration::schema::{ColumnSpec, ForeignKeySpec, SequenceSpec, TableDescriptor};
use crate::source::SourceDatabase;
use crate::utils::quote_ident;
use crate::value::{Row, Value, ID_COLUMN};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use std::error::Error as StdError;
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};
use tokio_postgres::Client;

/// Source reader bound to one schema of a PostgreSQL database
pub struct PostgresSource {
    client: Client,
    schema: String,
}

impl PostgresSource {
    pub fn new(client: Client, schema: impl Into<String>) -> Self {
        Self {
            client,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }
}

#[async_trait]
impl SourceDatabase for PostgresSource {
    async fn ping(&self) -> Result<()> {
        self.client
            .query_one("SELECT NOW()", &[])
            .await
            .context("Source ping query failed")?;
        Ok(())
    }

    async fn list_base_tables(&self) -> Result<Vec<TableDescriptor>> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text
                 FROM information_schema.tables
                 WHERE table_schema = $1
                   AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&self.schema],
            )
            .await
            .with_context(|| format!("Failed to list tables in schema '{}'", self.schema))?;

        Ok(rows
            .iter()
            .map(|row| TableDescriptor::new(row.get::<_, String>(0)))
            .collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnSpec>> {
        let rows = self
            .client
            .query(
                "SELECT
                    column_name::text,
                    data_type::text,
                    udt_name::text,
                    is_nullable::text,
                    column_default::text,
                    character_maximum_length::int4
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .with_context(|| format!("Failed to read columns of '{}'", table))?;

        Ok(rows
            .iter()
            .map(|row| ColumnSpec {
                name: row.get(0),
                data_type: row.get(1),
                udt_name: row.get(2),
                nullable: row.get::<_, String>(3) == "YES",
                default_expr: row.get(4),
                max_length: row.get(5),
            })
            .collect())
    }

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT kcu.column_name::text
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                  AND tc.table_name = kcu.table_name
                 WHERE tc.constraint_type = 'PRIMARY KEY'
                   AND tc.table_schema = $1
                   AND tc.table_name = $2
                 ORDER BY kcu.ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .with_context(|| format!("Failed to read primary key of '{}'", table))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeySpec>> {
        let rows = self
            .client
            .query(
                "SELECT
                    kcu.column_name::text,
                    ccu.table_name::text AS foreign_table_name,
                    ccu.column_name::text AS foreign_column_name
                 FROM information_schema.table_constraints AS tc
                 JOIN information_schema.key_column_usage AS kcu
                   ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                 JOIN information_schema.constraint_column_usage AS ccu
                   ON ccu.constraint_name = tc.constraint_name
                  AND ccu.table_schema = tc.table_schema
                 WHERE tc.constraint_type = 'FOREIGN KEY'
                   AND tc.table_schema = $1
                   AND tc.table_name = $2
                 ORDER BY kcu.ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .with_context(|| format!("Failed to read foreign keys of '{}'", table))?;

        Ok(rows
            .iter()
            .map(|row| ForeignKeySpec {
                column: row.get(0),
                foreign_table: row.get(1),
                foreign_column: row.get(2),
            })
            .collect())
    }

    async fn sequence_columns(&self, table: &str) -> Result<Vec<SequenceSpec>> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text, column_default::text
                 FROM information_schema.columns
                 WHERE table_schema = $1
                   AND table_name = $2
                   AND column_default LIKE 'nextval%'
                 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .with_context(|| format!("Failed to read sequence defaults of '{}'", table))?;

        Ok(rows
            .iter()
            .map(|row| SequenceSpec {
                column: row.get(0),
                default_expr: row.get(1),
            })
            .collect())
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualified(table));
        let row = self
            .client
            .query_one(&sql, &[])
            .await
            .with_context(|| format!("Failed to count rows in '{}'", table))?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn fetch_batch(&self, table: &str, limit: u64, offset: u64) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY {} LIMIT $1 OFFSET $2",
            self.qualified(table),
            quote_ident(ID_COLUMN)
        );
        let limit = i64::try_from(limit).context("Batch size exceeds BIGINT range")?;
        let offset = i64::try_from(offset).context("Offset exceeds BIGINT range")?;
        let params: [&(dyn ToSql + Sync); 2] = [&limit, &offset];

        let stream = self
            .client
            .query_raw(sql.as_str(), params)
            .await
            .with_context(|| format!("Failed to read batch at offset {} from '{}'", offset, table))?;
        let pg_rows: Vec<tokio_postgres::Row> = stream
            .try_collect()
            .await
            .with_context(|| format!("Failed to stream batch at offset {} from '{}'", offset, table))?;

        pg_rows.iter().map(decode_row).collect()
    }
}

/// Text-like values the standard `String` decoder refuses: enums, citext, etc.
struct RawText(String);

impl<'a> FromSql<'a> for RawText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(RawText(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
            || matches!(ty.name(), "citext" | "ltree" | "lquery" | "ltxtquery")
    }
}

/// Convert one source row into the generic row model
pub fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, idx)
            .with_context(|| format!("Failed to decode column '{}' ({})", column.name(), column.type_()))?;
        out.insert(column.name(), value);
    }
    Ok(out)
}

fn decode_value(row: &tokio_postgres::Row, idx: usize) -> Result<Value> {
    let ty = row.columns()[idx].type_().clone();

    let value = match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(|v| Value::Text(v.to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|v| Value::Text(v.to_string())),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<serde_json::Value>>(idx)?.map(Value::Json),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Value::TimestampTz),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => row
            .try_get::<_, Option<Vec<Option<String>>>>(idx)?
            .map(|v| Value::Json(serde_json::json!(v))),
        Type::INT4_ARRAY => row
            .try_get::<_, Option<Vec<Option<i32>>>>(idx)?
            .map(|v| Value::Json(serde_json::json!(v))),
        Type::INT8_ARRAY => row
            .try_get::<_, Option<Vec<Option<i64>>>>(idx)?
            .map(|v| Value::Json(serde_json::json!(v))),
        ref other if RawText::accepts(other) => {
            row.try_get::<_, Option<RawText>>(idx)?.map(|v| Value::Text(v.0))
        }
        ref other => bail!("unsupported column type '{}'", other.name()),
    };

    Ok(value.unwrap_or(Value::Null))
}
