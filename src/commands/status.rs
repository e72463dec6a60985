// ABOUTME: Status command implementation
// ABOUTME: Lists leftover progress checkpoints from interrupted runs

use crate::checkpoint::{ProgressCheckpoint, ProgressStore};
use anyhow::Result;
use std::path::Path;

/// Print every checkpoint found in `progress_dir`
pub fn status(progress_dir: &Path) -> Result<()> {
    let store = ProgressStore::new(progress_dir);
    let checkpoints = store.list()?;

    if checkpoints.is_empty() {
        println!(
            "No saved progress in {}; every table completed or none has started.",
            progress_dir.display()
        );
        return Ok(());
    }

    println!("Saved progress in {}:", progress_dir.display());
    for checkpoint in &checkpoints {
        println!("  {}", format_checkpoint(checkpoint));
    }
    Ok(())
}

fn format_checkpoint(checkpoint: &ProgressCheckpoint) -> String {
    let percent = if checkpoint.total_count == 0 {
        100.0
    } else {
        checkpoint.cursor as f64 * 100.0 / checkpoint.total_count as f64
    };
    format!(
        "{:<32} {:>10}/{:<10} ({:5.1}%)  saved {}",
        checkpoint.table_name,
        checkpoint.cursor,
        checkpoint.total_count,
        percent,
        checkpoint.timestamp.to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn formats_cursor_and_percent() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let checkpoint = store.save("users", 1000, 2500).unwrap();
        let line = format_checkpoint(&checkpoint);
        assert!(line.starts_with("users"));
        assert!(line.contains("1000/2500"));
        assert!(line.contains("40.0%"));
    }

    #[test]
    fn status_of_empty_directory_succeeds() {
        let dir = tempdir().unwrap();
        status(dir.path()).unwrap();
    }
}
