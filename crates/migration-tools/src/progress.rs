//! Progress reporting for row transfers.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Progress tracker over inserted rows.
pub struct TransferProgress {
    bar: ProgressBar,
    start_time: Instant,
}

impl TransferProgress {
    /// Create a tracker. Without a known total it shows a spinner with a running
    /// count; when `visible` is false nothing is drawn.
    pub fn new(total_rows: Option<u64>, visible: bool) -> Self {
        let bar = match (visible, total_rows) {
            (false, _) => ProgressBar::hidden(),
            (true, Some(total)) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%) | {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar
            }
            (true, None) => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {pos} rows | {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message("Inserting rows...");

        TransferProgress {
            bar,
            start_time: Instant::now(),
        }
    }

    /// Advance by `rows` written rows.
    pub fn inc(&self, rows: usize) {
        self.bar.inc(rows as u64);
    }

    /// Set a custom message.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.bar.set_message(msg.into());
    }

    /// Rows counted so far.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish progress and return elapsed time.
    pub fn finish(self) -> Duration {
        self.bar.finish_with_message("Insertion complete");
        self.start_time.elapsed()
    }

    /// Leave the bar where it stopped, with a message.
    pub fn abandon(self, msg: impl Into<String>) {
        self.bar.abandon_with_message(msg.into());
    }
}
