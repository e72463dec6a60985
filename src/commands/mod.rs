// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports migrate, check, and status commands

pub mod check;
pub mod migrate;
pub mod status;

pub use check::check;
pub use migrate::{migrate, MigrateOptions, ResumePolicy};
pub use status::status;

use crate::config::MigrationConfig;
use crate::destination::SupabaseClient;
use crate::error::MigrationError;
use crate::postgres::{self, PostgresSource};
use anyhow::{Context, Result};

/// Open both stores described by `config`
///
/// A source that cannot be reached is reported as a connectivity failure.
pub(crate) async fn open_stores(config: &MigrationConfig) -> Result<(PostgresSource, SupabaseClient)> {
    tracing::info!(
        host = %config.source.host,
        port = config.source.port,
        database = %config.source.database,
        "Connecting to source database..."
    );
    let client = postgres::connect(&config.source)
        .await
        .map_err(|e| MigrationError::Connectivity {
            store: "source",
            message: format!("{:#}", e),
        })?;
    let source = PostgresSource::new(client, config.source.schema.clone());

    let destination =
        SupabaseClient::new(&config.destination).context("Failed to configure Supabase client")?;
    Ok((source, destination))
}
