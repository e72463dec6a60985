// ABOUTME: Migrate command implementation
// ABOUTME: Wires configuration, stores, prompts, and progress into the migration driver

use crate::checkpoint::ProgressStore;
use crate::config::MigrationConfig;
use crate::filters::TableFilter;
use crate::interactive::{Confirmer, FixedAnswer, TerminalConfirm};
use crate::migration::{run_migration, MigrationContext, RunError, RunSummary};
use crate::progress::{ConsoleProgress, NoProgress, ProgressObserver};
use anyhow::Result;
use std::io::IsTerminal;

/// How to answer "resume from checkpoint?" questions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Ask on the terminal, or restart when there is no terminal
    Ask,
    Always,
    Never,
}

impl ResumePolicy {
    pub fn from_flags(yes: bool, no_resume: bool) -> Self {
        match (yes, no_resume) {
            (true, _) => ResumePolicy::Always,
            (false, true) => ResumePolicy::Never,
            (false, false) => ResumePolicy::Ask,
        }
    }

    fn confirmer(self, interactive: bool) -> Box<dyn Confirmer> {
        match self {
            ResumePolicy::Always => Box::new(FixedAnswer(true)),
            ResumePolicy::Never => Box::new(FixedAnswer(false)),
            ResumePolicy::Ask if interactive => Box::new(TerminalConfirm),
            ResumePolicy::Ask => {
                tracing::warn!(
                    "⚠ No terminal attached; saved progress will be ignored. Pass --yes to resume."
                );
                Box::new(FixedAnswer(false))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub resume: ResumePolicy,
    pub filter: TableFilter,
}

/// Migrate every selected source table into the destination
///
/// # Errors
///
/// Fails when either store is unreachable or any table fails; the failing
/// table's checkpoint is kept so the next run can resume it.
pub async fn migrate(config: &MigrationConfig, options: MigrateOptions) -> Result<()> {
    tracing::info!(
        strategy = %config.transfer.strategy,
        batch_size = config.transfer.batch_size,
        max_retries = config.transfer.max_retries,
        retry_delay_ms = config.transfer.retry_delay.as_millis() as u64,
        batch_timeout_ms = config.transfer.batch_timeout.as_millis() as u64,
        progress_dir = %config.progress_dir.display(),
        "Starting migration"
    );

    let (source, destination) = super::open_stores(config).await?;
    let store = ProgressStore::new(&config.progress_dir);
    let confirmer = options.resume.confirmer(std::io::stdin().is_terminal());
    let progress: Box<dyn ProgressObserver> = if std::io::stderr().is_terminal() {
        Box::new(ConsoleProgress::new())
    } else {
        Box::new(NoProgress)
    };

    let ctx = MigrationContext {
        source: &source,
        destination: &destination,
        store: &store,
        confirmer: confirmer.as_ref(),
        progress: progress.as_ref(),
        settings: &config.transfer,
    };

    match run_migration(&ctx, &options.filter).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(err) => {
            if let RunError::Table {
                table, completed, ..
            } = &err
            {
                print_summary(completed);
                println!("  ✗ {}: {}", table, err.migration_error());
                println!();
                println!("Re-run the command to resume '{}' from its last checkpoint.", table);
            }
            Err(err.into())
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("========================================");
    println!("Migration Summary");
    println!("========================================");
    if summary.tables.is_empty() {
        println!("No tables completed");
    }
    for outcome in &summary.tables {
        println!(
            "  ✓ {:<32} updated {:>8}  inserted {:>8}  skipped {:>8}  total {:>8}",
            outcome.table, outcome.updated, outcome.inserted, outcome.skipped, outcome.total
        );
    }
    println!("----------------------------------------");
    println!(
        "  {} table(s): updated {}, inserted {}, skipped {}, total {}",
        summary.tables.len(),
        summary.updated(),
        summary.inserted(),
        summary.skipped(),
        summary.total()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_policy_from_flags() {
        assert_eq!(ResumePolicy::from_flags(true, false), ResumePolicy::Always);
        assert_eq!(ResumePolicy::from_flags(false, true), ResumePolicy::Never);
        assert_eq!(ResumePolicy::from_flags(false, false), ResumePolicy::Ask);
    }

    #[tokio::test]
    async fn non_interactive_ask_restarts() {
        let confirmer = ResumePolicy::Ask.confirmer(false);
        assert!(!confirmer.confirm("Resume?").await.unwrap());
        let confirmer = ResumePolicy::Always.confirmer(false);
        assert!(confirmer.confirm("Resume?").await.unwrap());
    }
}
