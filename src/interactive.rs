// ABOUTME: Yes/no confirmation used before resuming an interrupted table
// ABOUTME: Terminal prompt via dialoguer, or a fixed answer for unattended runs

use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Answers a yes/no question for the migration engine
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Ask the operator on the controlling terminal
///
/// The prompt defaults to "no" so an accidental Enter restarts the table
/// from the beginning rather than trusting a stale checkpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

#[async_trait]
impl Confirmer for TerminalConfirm {
    async fn confirm(&self, question: &str) -> Result<bool> {
        let prompt = question.to_string();
        tokio::task::spawn_blocking(move || {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(false)
                .interact()
                .context("Failed to get confirmation")
        })
        .await
        .context("Confirmation prompt task failed")?
    }
}

/// Always answer the same way (`--yes`, `--no-resume`, or no terminal)
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl Confirmer for FixedAnswer {
    async fn confirm(&self, question: &str) -> Result<bool> {
        tracing::info!(
            answer = if self.0 { "yes" } else { "no" },
            "{}",
            question
        );
        Ok(self.0)
    }
}
