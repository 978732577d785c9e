//! Per-file block progress
//!
//! The upload engine ticks one block at a time from any worker thread;
//! rendering is up to the sink.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub trait ProgressSink: Send + Sync {
    fn begin(&self, _label: &str, _total_blocks: u64) {}
    fn advance(&self, _blocks: u64) {}
    fn finish(&self) {}
}

pub struct NoProgress;
impl ProgressSink for NoProgress {}

/// Terminal progress bar, reused across files
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} blocks ({per_sec}, {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn begin(&self, label: &str, total_blocks: u64) {
        self.bar.reset();
        self.bar.set_length(total_blocks);
        self.bar.set_message(format!("Uploading {}", label));
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn advance(&self, blocks: u64) {
        self.bar.inc(blocks);
    }

    fn finish(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish();
    }
}
