// ABOUTME: PostgreSQL source connection setup with TLS and TCP keepalive
// ABOUTME: Translates driver failures into actionable connection errors

use crate::config::SourceConfig;
use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

/// Apply TCP keepalive settings so idle connections survive load balancers
///
/// - keepalives enabled
/// - first probe after 60 seconds idle
/// - subsequent probes every 10 seconds
pub fn apply_keepalive(config: &mut tokio_postgres::Config) {
    config
        .keepalives(true)
        .keepalives_idle(Duration::from_secs(60))
        .keepalives_interval(Duration::from_secs(10));
}

/// Map a driver error message to guidance for the operator
fn describe_connect_error(error_msg: &str, source: &SourceConfig) -> anyhow::Error {
    if error_msg.contains("password authentication failed") {
        anyhow::anyhow!(
            "Authentication failed for user '{}': invalid username or password.\n\
             Please verify SOURCE_DB_USER and SOURCE_DB_PASSWORD.",
            source.user
        )
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        anyhow::anyhow!(
            "Database '{}' does not exist on {}:{}\n\
             Error: {}",
            source.database,
            source.host,
            source.port,
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect")
    {
        anyhow::anyhow!(
            "Connection refused: unable to reach {}:{}.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            source.host,
            source.port,
            error_msg
        )
    } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
        anyhow::anyhow!(
            "Connection timeout: server did not respond within {:?}.\n\
             Raise CONNECTION_TIMEOUT if the server is slow to accept connections.\n\
             Error: {}",
            source.connect_timeout,
            error_msg
        )
    } else if error_msg.contains("SSL") || error_msg.contains("TLS") {
        anyhow::anyhow!(
            "TLS/SSL error: failed to establish secure connection.\n\
             Set SOURCE_DB_SSLMODE=disable for servers without TLS.\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("no pg_hba.conf entry") {
        anyhow::anyhow!(
            "Access denied: no pg_hba.conf entry for this host.\n\
             Contact your database administrator to update pg_hba.conf.\n\
             Error: {}",
            error_msg
        )
    } else {
        anyhow::anyhow!("Failed to connect to source database: {}", error_msg)
    }
}

/// Connect to the source database
///
/// The connection task is spawned onto the runtime and logs its own
/// failure; the returned `Client` is shared read-only for the run.
///
/// # Errors
///
/// Returns an error with operator guidance when authentication, DNS/TCP,
/// TLS negotiation, or the connect timeout fails.
pub async fn connect(source: &SourceConfig) -> Result<Client> {
    let mut config = source.to_pg_config();
    apply_keepalive(&mut config);

    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(tls_connector);

    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| describe_connect_error(&e.to_string(), source))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Source connection error: {}", e);
        }
    });

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_postgres::config::SslMode;

    fn source() -> SourceConfig {
        SourceConfig {
            host: "db.internal".to_string(),
            port: 5433,
            database: "app".to_string(),
            user: "migrator".to_string(),
            password: None,
            connect_timeout: Duration::from_secs(5),
            schema: "public".to_string(),
            ssl_mode: SslMode::Disable,
        }
    }

    #[test]
    fn test_apply_keepalive() {
        let mut config = source().to_pg_config();
        apply_keepalive(&mut config);
        assert!(config.get_keepalives());
        assert_eq!(config.get_keepalives_idle(), Duration::from_secs(60));
    }

    #[test]
    fn test_pg_config_carries_parameters() {
        let config = source().to_pg_config();
        assert_eq!(config.get_user(), Some("migrator"));
        assert_eq!(config.get_dbname(), Some("app"));
        assert_eq!(config.get_ports(), &[5433]);
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(5)));
    }

    #[test]
    fn test_describe_auth_failure() {
        let err = describe_connect_error("password authentication failed for user", &source());
        assert!(err.to_string().contains("Authentication failed for user 'migrator'"));
    }

    #[test]
    fn test_describe_refused() {
        let err = describe_connect_error("Connection refused (os error 111)", &source());
        assert!(err.to_string().contains("db.internal:5433"));
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_fails() {
        let mut cfg = source();
        cfg.host = "127.0.0.1".to_string();
        cfg.port = 1;
        cfg.connect_timeout = Duration::from_millis(500);
        assert!(connect(&cfg).await.is_err());
    }

    // Requires a reachable PostgreSQL instance
    #[tokio::test]
    #[ignore]
    async fn test_connect_with_valid_config_succeeds() {
        let mut cfg = source();
        cfg.host = std::env::var("TEST_SOURCE_HOST").unwrap_or_else(|_| "localhost".into());
        cfg.port = 5432;
        cfg.database = std::env::var("TEST_SOURCE_DB").unwrap_or_else(|_| "postgres".into());
        cfg.user = std::env::var("TEST_SOURCE_USER").unwrap_or_else(|_| "postgres".into());
        cfg.password = std::env::var("TEST_SOURCE_PASSWORD").ok();
        assert!(connect(&cfg).await.is_ok());
    }
}
