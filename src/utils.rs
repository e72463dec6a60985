// ABOUTME: Identifier and literal quoting helpers for generated SQL
// ABOUTME: Keeps table and column names safe inside DDL and catalog queries

/// Quote a PostgreSQL identifier, doubling embedded quotes
///
/// # Examples
///
/// ```
/// # use supabase_table_migrator::utils::quote_ident;
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("my\"table"), "\"my\"\"table\"");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote a SQL string literal, doubling embedded single quotes
///
/// # Examples
///
/// ```
/// # use supabase_table_migrator::utils::quote_literal;
/// assert_eq!(quote_literal("abc"), "'abc'");
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// ```
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
