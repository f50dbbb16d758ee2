//! Utilities module for logging, metrics, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Loss, accuracy and running metric accumulation
//! - Error handling types
//! - Progress bar and duration formatting helpers

pub mod error;
pub mod logging;
pub mod metrics;

use indicatif::{ProgressBar, ProgressStyle};

// Re-export main types for convenience
pub use error::{Cifar10Error, Result};
pub use logging::{init_logging, LogConfig, LogLevel};
pub use metrics::{batch_accuracy, cross_entropy_one_hot, RunningMetrics};

const BATCH_BAR_TEMPLATE: &str =
    "{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar over the batches of one pass
pub fn batch_progress_bar(len: usize, prefix: impl Into<String>) -> ProgressBar {
    let style = ProgressStyle::with_template(BATCH_BAR_TEMPLATE)
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    let bar = ProgressBar::new(len as u64);
    bar.set_style(style);
    bar.set_prefix(prefix.into());
    bar
}

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_batch_progress_bar_length() {
        let bar = batch_progress_bar(12, "Epoch: 1/[5]");
        assert_eq!(bar.length(), Some(12));
        assert_eq!(bar.prefix(), "Epoch: 1/[5]");
    }
}
