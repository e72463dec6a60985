// ABOUTME: Immutable run configuration assembled from defaults, TOML, and environment
// ABOUTME: Parses duplicate strategy, batch/retry knobs, and connection parameters

use crate::error::{MigrationError, Result};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio_postgres::config::SslMode;

pub const DEFAULT_BATCH_SIZE: u64 = 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5000;
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 30000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30000;
pub const DEFAULT_SQL_FUNCTION: &str = "exec_sql";
pub const DEFAULT_PROGRESS_DIR: &str = "logs";

/// How rows that already exist in the destination are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateStrategy {
    /// Upsert the whole batch keyed on `id`
    #[default]
    Update,
    /// Keep the destination row, insert only absent ids
    Skip,
    /// Abort the batch when any id already exists
    Error,
    /// Bulk insert without looking at existing rows
    Append,
}

impl DuplicateStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateStrategy::Update => "update",
            DuplicateStrategy::Skip => "skip",
            DuplicateStrategy::Error => "error",
            DuplicateStrategy::Append => "append",
        }
    }
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateStrategy {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(DuplicateStrategy::Update),
            "skip" => Ok(DuplicateStrategy::Skip),
            "error" => Ok(DuplicateStrategy::Error),
            "append" => Ok(DuplicateStrategy::Append),
            other => Err(MigrationError::Config(format!(
                "unknown duplicate strategy '{}' (expected update, skip, error or append)",
                other
            ))),
        }
    }
}

/// Source PostgreSQL connection parameters
#[derive(Clone)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub schema: String,
    pub ssl_mode: SslMode,
}

impl SourceConfig {
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .connect_timeout(self.connect_timeout)
            .ssl_mode(self.ssl_mode)
            .application_name("supabase-table-migrator");
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Supabase endpoint and service credential
#[derive(Clone)]
pub struct DestinationConfig {
    pub url: String,
    pub service_key: String,
    pub sql_function: String,
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .field("sql_function", &self.sql_function)
            .finish()
    }
}

/// Knobs that govern how each table is transferred
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    pub strategy: DuplicateStrategy,
    pub batch_size: u64,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub batch_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            strategy: DuplicateStrategy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
        }
    }
}

impl TransferSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay, self.batch_timeout)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(MigrationError::Config(
                "BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(MigrationError::Config(
                "MAX_RETRIES must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Values given on the command line; they win over every other layer
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub strategy: Option<DuplicateStrategy>,
    pub batch_size: Option<u64>,
}

/// Fully resolved configuration for one run
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub transfer: TransferSettings,
    pub progress_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    migration: MigrationSection,
    #[serde(default)]
    source: SourceSection,
    #[serde(default)]
    destination: DestinationSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MigrationSection {
    duplicate_strategy: Option<String>,
    batch_size: Option<u64>,
    max_retries: Option<u32>,
    retry_delay: Option<u64>,
    batch_timeout: Option<u64>,
    progress_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceSection {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    connect_timeout: Option<u64>,
    schema: Option<String>,
    sslmode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DestinationSection {
    url: Option<String>,
    service_key: Option<String>,
    sql_function: Option<String>,
}

impl MigrationConfig {
    /// Load configuration from an optional TOML file and the process environment
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file = read_file_config(path)?;
        Self::resolve(file, |key| std::env::var(key).ok(), overrides)
    }

    /// Resolve configuration from TOML text and an environment lookup
    ///
    /// Environment values override file values; empty environment values are
    /// treated as unset.
    pub fn from_sources<F>(toml_text: &str, env: F, overrides: &ConfigOverrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::resolve(parse_file_config(toml_text)?, env, overrides)
    }

    fn resolve<F>(file: FileConfig, env: F, overrides: &ConfigOverrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let strategy = match env("DUPLICATE_STRATEGY").or(file.migration.duplicate_strategy) {
            Some(raw) => raw.parse()?,
            None => DuplicateStrategy::default(),
        };
        let mut transfer = TransferSettings {
            strategy,
            batch_size: env_number(&env, "BATCH_SIZE")?
                .or(file.migration.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_retries: env_number(&env, "MAX_RETRIES")?
                .or(file.migration.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_millis(
                env_number(&env, "RETRY_DELAY")?
                    .or(file.migration.retry_delay)
                    .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
            batch_timeout: Duration::from_millis(
                env_number(&env, "BATCH_TIMEOUT")?
                    .or(file.migration.batch_timeout)
                    .unwrap_or(DEFAULT_BATCH_TIMEOUT_MS),
            ),
        };
        if let Some(strategy) = overrides.strategy {
            transfer.strategy = strategy;
        }
        if let Some(batch_size) = overrides.batch_size {
            transfer.batch_size = batch_size;
        }
        transfer.validate()?;

        let ssl_mode = match env("SOURCE_DB_SSLMODE").or(file.source.sslmode) {
            Some(raw) => parse_ssl_mode(&raw)?,
            None => SslMode::Prefer,
        };
        let source = SourceConfig {
            host: required(env("SOURCE_DB_HOST").or(file.source.host), "SOURCE_DB_HOST")?,
            port: env_number(&env, "SOURCE_DB_PORT")?
                .or(file.source.port)
                .unwrap_or(5432),
            database: required(
                env("SOURCE_DB_NAME").or(file.source.database),
                "SOURCE_DB_NAME",
            )?,
            user: required(env("SOURCE_DB_USER").or(file.source.user), "SOURCE_DB_USER")?,
            password: env("SOURCE_DB_PASSWORD").or(file.source.password),
            connect_timeout: Duration::from_millis(
                env_number(&env, "CONNECTION_TIMEOUT")?
                    .or(file.source.connect_timeout)
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            schema: env("SOURCE_DB_SCHEMA")
                .or(file.source.schema)
                .unwrap_or_else(|| "public".to_string()),
            ssl_mode,
        };

        let destination = DestinationConfig {
            url: required(env("SUPABASE_URL").or(file.destination.url), "SUPABASE_URL")?,
            service_key: required(
                env("SUPABASE_SERVICE_ROLE_KEY").or(file.destination.service_key),
                "SUPABASE_SERVICE_ROLE_KEY",
            )?,
            sql_function: env("SUPABASE_SQL_FUNCTION")
                .or(file.destination.sql_function)
                .unwrap_or_else(|| DEFAULT_SQL_FUNCTION.to_string()),
        };

        let progress_dir = resolve_progress_dir(&env, file.migration.progress_dir);

        Ok(Self {
            source,
            destination,
            transfer,
            progress_dir,
        })
    }
}

/// Resolve only the checkpoint directory; no credentials are required
pub fn load_progress_dir(path: Option<&Path>) -> Result<PathBuf> {
    let file = read_file_config(path)?;
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
    Ok(resolve_progress_dir(&env, file.migration.progress_dir))
}

/// Load `KEY=value` pairs from an env file into the process environment
///
/// Variables that are already set keep their values. Returns `false` when
/// the file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenv::from_path(path) {
        Ok(()) => Ok(true),
        Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MigrationError::Config(format!(
            "failed to load env file at {}: {}",
            path.display(),
            e
        ))),
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let raw = fs::read_to_string(path).map_err(|e| {
        MigrationError::Config(format!(
            "failed to read config file at {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_file_config(&raw)
}

fn parse_file_config(toml_text: &str) -> Result<FileConfig> {
    toml::from_str(toml_text)
        .map_err(|e| MigrationError::Config(format!("failed to parse TOML config: {}", e)))
}

fn resolve_progress_dir<F>(env: &F, from_file: Option<PathBuf>) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    env("PROGRESS_DIR")
        .map(PathBuf::from)
        .or(from_file)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRESS_DIR))
}

fn env_number<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            MigrationError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
        None => Ok(None),
    }
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    value.ok_or_else(|| MigrationError::Config(format!("{} is required", key)))
}

fn parse_ssl_mode(raw: &str) -> Result<SslMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => Err(MigrationError::Config(format!(
            "unsupported SOURCE_DB_SSLMODE '{}' (expected disable, prefer or require)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SOURCE_DB_HOST", "localhost"),
            ("SOURCE_DB_NAME", "app"),
            ("SOURCE_DB_USER", "postgres"),
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
        ])
    }

    fn resolve(
        toml_text: &str,
        env: &HashMap<&'static str, &'static str>,
        overrides: &ConfigOverrides,
    ) -> Result<MigrationConfig> {
        MigrationConfig::from_sources(toml_text, |k| env.get(k).map(|v| v.to_string()), overrides)
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = resolve("", &base_env(), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.transfer, TransferSettings::default());
        assert_eq!(config.transfer.strategy, DuplicateStrategy::Update);
        assert_eq!(config.transfer.batch_size, 1000);
        assert_eq!(config.transfer.max_retries, 3);
        assert_eq!(config.transfer.retry_delay, Duration::from_millis(5000));
        assert_eq!(config.transfer.batch_timeout, Duration::from_millis(30000));
        assert_eq!(config.source.port, 5432);
        assert_eq!(config.source.schema, "public");
        assert_eq!(config.destination.sql_function, "exec_sql");
        assert_eq!(config.progress_dir, PathBuf::from("logs"));
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let mut env = base_env();
        env.insert("DUPLICATE_STRATEGY", "skip");
        env.insert("BATCH_SIZE", "250");
        let toml_text = r#"
            [migration]
            duplicate_strategy = "append"
            batch_size = 50
            retry_delay = 10

            [source]
            port = 6543
        "#;

        let config = resolve(toml_text, &env, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.transfer.strategy, DuplicateStrategy::Skip);
        assert_eq!(config.transfer.batch_size, 250);
        assert_eq!(config.transfer.retry_delay, Duration::from_millis(10));
        assert_eq!(config.source.port, 6543);

        let overrides = ConfigOverrides {
            strategy: Some(DuplicateStrategy::Error),
            batch_size: Some(10),
        };
        let config = resolve(toml_text, &env, &overrides).unwrap();
        assert_eq!(config.transfer.strategy, DuplicateStrategy::Error);
        assert_eq!(config.transfer.batch_size, 10);
    }

    #[test]
    fn rejects_unknown_strategy() {
        let mut env = base_env();
        env.insert("DUPLICATE_STRATEGY", "merge");
        let err = resolve("", &env, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("unknown duplicate strategy 'merge'"));
    }

    #[test]
    fn rejects_zero_batch_size_and_retries() {
        let mut env = base_env();
        env.insert("BATCH_SIZE", "0");
        assert!(resolve("", &env, &ConfigOverrides::default()).is_err());

        let mut env = base_env();
        env.insert("MAX_RETRIES", "0");
        assert!(resolve("", &env, &ConfigOverrides::default()).is_err());
    }

    #[test]
    fn rejects_non_numeric_values() {
        let mut env = base_env();
        env.insert("BATCH_TIMEOUT", "soon");
        let err = resolve("", &env, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("BATCH_TIMEOUT"));
    }

    #[test]
    fn requires_destination_credentials() {
        let mut env = base_env();
        env.remove("SUPABASE_SERVICE_ROLE_KEY");
        let err = resolve("", &env, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_SERVICE_ROLE_KEY"));
    }

    #[test]
    fn empty_env_values_count_as_unset() {
        let mut env = base_env();
        env.insert("BATCH_SIZE", "");
        let config = resolve("", &env, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.transfer.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn strategy_parsing_is_case_insensitive() {
        assert_eq!(
            "UPDATE".parse::<DuplicateStrategy>().unwrap(),
            DuplicateStrategy::Update
        );
        assert_eq!(
            " Append ".parse::<DuplicateStrategy>().unwrap(),
            DuplicateStrategy::Append
        );
    }

    #[test]
    fn progress_dir_comes_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrator.toml");
        fs::write(&path, "[migration]\nprogress_dir = \"state/checkpoints\"\n").unwrap();
        let file = read_file_config(Some(&path)).unwrap();
        assert_eq!(
            resolve_progress_dir(&|_: &str| None, file.migration.progress_dir),
            PathBuf::from("state/checkpoints")
        );

        let missing = read_file_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(missing.to_string().contains("failed to read config file"));
    }

    #[test]
    fn env_file_does_not_override_existing_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "MIGRATOR_ENV_FILE_FRESH=from-file\nMIGRATOR_ENV_FILE_PRESET=from-file\n",
        )
        .unwrap();
        std::env::set_var("MIGRATOR_ENV_FILE_PRESET", "from-process");

        assert!(load_env_file(&path).unwrap());
        assert_eq!(std::env::var("MIGRATOR_ENV_FILE_FRESH").unwrap(), "from-file");
        assert_eq!(
            std::env::var("MIGRATOR_ENV_FILE_PRESET").unwrap(),
            "from-process"
        );
        assert!(!load_env_file(&dir.path().join("missing.env")).unwrap());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut env = base_env();
        env.insert("SOURCE_DB_PASSWORD", "hunter2");
        let config = resolve("", &env, &ConfigOverrides::default()).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("service-key"));
    }
}
