use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar shown while a stage maps over a collection.
///
/// Disabled monitors (tests, non-interactive runs) hide the bar but keep
/// counting, so callers never need to branch on it.
pub struct ProgressMonitor {
    bar: ProgressBar,
    failed: usize,
    enabled: bool,
}

impl ProgressMonitor {
    /// Create a monitor over `total` items, labelled with the stage name.
    pub fn new(stage: &str, total: usize, enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        if enabled {
            let style = ProgressStyle::default_bar()
                .template("{prefix:>20} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  ");
            bar.set_style(style);
            bar.set_prefix(stage.to_string());
        }
        Self {
            bar,
            failed: 0,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Show the item currently being processed.
    pub fn start_item(&self, item: &str) {
        if self.enabled {
            self.bar.set_message(item.to_string());
        }
    }

    pub fn finish_item(&mut self, success: bool) {
        if !success {
            self.failed += 1;
        }
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        let msg = if self.failed == 0 {
            "done".to_string()
        } else {
            format!("done, {} failed", self.failed)
        };
        self.bar.finish_with_message(msg);
    }

    pub fn clear(&self) {
        if self.enabled {
            self.bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_monitor_disabled() {
        let mut monitor = ProgressMonitor::new("reduce", 3, false);

        // Hidden bars still count.
        monitor.start_item("frame-1");
        monitor.finish_item(true);
        monitor.finish_item(false);
        monitor.finish();
        assert_eq!(monitor.position(), 2);
        assert_eq!(monitor.failed(), 1);
        assert!(!monitor.is_enabled());
    }

    #[test]
    fn test_progress_monitor_enabled() {
        let mut monitor = ProgressMonitor::new("reduce", 2, true);

        monitor.start_item("frame-1");
        monitor.finish_item(true);
        monitor.start_item("frame-2");
        monitor.finish_item(false);

        monitor.finish();
        assert_eq!(monitor.failed(), 1);
    }
}
