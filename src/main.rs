// ABOUTME: CLI entry point for supabase-table-migrator
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use supabase_table_migrator::commands::{self, MigrateOptions, ResumePolicy};
use supabase_table_migrator::config::{self, ConfigOverrides, DuplicateStrategy, MigrationConfig};
use supabase_table_migrator::filters::TableFilter;
use supabase_table_migrator::logging;

#[derive(Parser)]
#[command(name = "supabase-table-migrator")]
#[command(about = "Resumable batch migration of PostgreSQL tables into Supabase", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every source table into the destination
    Migrate {
        /// Duplicate handling: update, skip, error, or append
        #[arg(long)]
        strategy: Option<DuplicateStrategy>,
        /// Rows per batch
        #[arg(long)]
        batch_size: Option<u64>,
        /// Resume from saved progress without asking
        #[arg(short = 'y', long, conflicts_with = "no_resume")]
        yes: bool,
        /// Ignore saved progress and restart every table from the first row
        #[arg(long)]
        no_resume: bool,
        /// Include only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        include_tables: Option<Vec<String>>,
        /// Exclude these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude_tables: Option<Vec<String>>,
    },
    /// Verify source and destination are reachable
    Check {
        /// Include only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        include_tables: Option<Vec<String>>,
        /// Exclude these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude_tables: Option<Vec<String>>,
    },
    /// Show saved progress of interrupted table migrations
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = config::load_env_file(Path::new(".env"))?;

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let progress_dir = config::load_progress_dir(config_path)?;
    logging::init(&progress_dir);
    if env_file_loaded {
        tracing::debug!("Loaded environment from .env");
    }

    match cli.command {
        Commands::Migrate {
            strategy,
            batch_size,
            yes,
            no_resume,
            include_tables,
            exclude_tables,
        } => {
            let filter = TableFilter::new(include_tables, exclude_tables)?;
            let overrides = ConfigOverrides {
                strategy,
                batch_size,
            };
            let config = MigrationConfig::load(config_path, &overrides)?;
            let options = MigrateOptions {
                resume: ResumePolicy::from_flags(yes, no_resume),
                filter,
            };
            commands::migrate(&config, options).await
        }
        Commands::Check {
            include_tables,
            exclude_tables,
        } => {
            let filter = TableFilter::new(include_tables, exclude_tables)?;
            let config = MigrationConfig::load(config_path, &ConfigOverrides::default())?;
            commands::check(&config, &filter).await
        }
        Commands::Status => commands::status(&progress_dir),
    }
}
