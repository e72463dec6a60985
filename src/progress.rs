// ABOUTME: Per-table progress reporting for the batch transfer loop
// ABOUTME: Console bar via indicatif, plus a silent observer for tests and pipes

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

const BAR_TEMPLATE: &str = "{bar:40} {percent}% | {pos}/{len} | {msg}";
const BAR_CHARS: &str = "█░";

/// Receives position updates while a table is transferred
pub trait ProgressObserver: Send + Sync {
    /// A table transfer begins at `position` of `total`
    fn start(&self, table: &str, total: u64, position: u64);

    /// Rows up to `position` are committed
    fn advance(&self, position: u64);

    fn finish(&self);

    /// The transfer stopped before completion
    fn abandon(&self);
}

/// Progress bar on stderr, one per table
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(BAR_CHARS)
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl ProgressObserver for ConsoleProgress {
    fn start(&self, table: &str, total: u64, position: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(Self::style());
        bar.set_message(table.to_string());
        bar.set_position(position.min(total));
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(previous) = guard.replace(bar) {
                previous.abandon();
            }
        }
    }

    fn advance(&self, position: u64) {
        self.with_bar(|bar| bar.set_position(position));
    }

    fn finish(&self) {
        if let Some(bar) = self.take_bar() {
            bar.finish();
        }
    }

    fn abandon(&self) {
        if let Some(bar) = self.take_bar() {
            bar.abandon();
        }
    }
}

/// Discards all progress updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn start(&self, _table: &str, _total: u64, _position: u64) {}
    fn advance(&self, _position: u64) {}
    fn finish(&self) {}
    fn abandon(&self) {}
}
