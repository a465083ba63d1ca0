//! Terminal progress bar for long-running operations

use indicatif::{ProgressBar, ProgressStyle};
use pexcz_core::ProgressSink;
use std::time::Duration;

/// Progress sink drawing a single bar on stderr
pub struct BarProgress {
    message: String,
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            bar: None,
        }
    }
}

impl ProgressSink for BarProgress {
    fn start(&mut self, total: u64) {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message(self.message.clone());
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(bar);
    }

    fn update(&mut self, completed: u64, _total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(completed);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message("Complete");
        }
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}
