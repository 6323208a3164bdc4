use super::cancel::CancelToken;
use super::progress::ProgressMonitor;
use crate::cache::CacheManager;
use crate::config::Configuration;
use crate::error::StageError;
use crate::logging::StageLogger;

/// Everything a stage body may touch while it runs.
pub struct StageContext<'a> {
    pub(crate) stage: &'a str,
    pub(crate) config: &'a mut Configuration,
    pub(crate) cache: &'a mut CacheManager,
    pub(crate) logger: &'a dyn StageLogger,
    pub(crate) cancel: &'a CancelToken,
    pub(crate) pause: &'a mut bool,
    pub(crate) debug: bool,
    pub(crate) progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFailure {
    pub item: String,
    pub error: String,
}

/// Outcome of [`StageContext::map_collection`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapSummary<R> {
    pub results: Vec<R>,
    pub failures: Vec<MapFailure>,
    pub processed: usize,
}

impl<R> MapSummary<R> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            failures: Vec::new(),
            processed: 0,
        }
    }

    /// Fraction of processed items that failed.
    pub fn error_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.failures.len() as f64 / self.processed as f64
    }
}

impl<'a> StageContext<'a> {
    pub fn stage_name(&self) -> &str {
        self.stage
    }

    pub fn config(&self) -> &Configuration {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut Configuration {
        self.config
    }

    pub fn cache(&mut self) -> &mut CacheManager {
        self.cache
    }

    pub fn logger(&self) -> &dyn StageLogger {
        self.logger
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Stop the walk once this stage returns. A later run resumes it.
    pub fn request_pause(&mut self) {
        *self.pause = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return `StageError::Cancelled` if the user interrupted the run.
    pub fn check_cancelled(&self) -> Result<(), StageError> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        Ok(())
    }

    /// Apply `f` to every item, trapping per-item errors.
    ///
    /// A progress bar is drawn while console logging is switched off.
    /// Cancellation always propagates; in debug mode the first trapped
    /// error is returned instead of being collected.
    pub fn map_collection<T, R, I, L, F>(
        &self,
        items: I,
        label: L,
        mut f: F,
    ) -> Result<MapSummary<R>, StageError>
    where
        I: IntoIterator<Item = T>,
        L: Fn(&T) -> String,
        F: FnMut(T) -> Result<R, StageError>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return Ok(MapSummary::empty());
        }

        let mut monitor = ProgressMonitor::new(self.stage, items.len(), self.progress);
        if monitor.is_enabled() {
            self.logger.set_console(false);
        }

        let outcome = self.map_items(items, &label, &mut f, &mut monitor);

        if monitor.is_enabled() {
            monitor.clear();
            self.logger.set_console(true);
        }

        let summary = outcome?;
        self.report_failures(&summary);
        Ok(summary)
    }

    fn map_items<T, R, L, F>(
        &self,
        items: Vec<T>,
        label: &L,
        f: &mut F,
        monitor: &mut ProgressMonitor,
    ) -> Result<MapSummary<R>, StageError>
    where
        L: Fn(&T) -> String,
        F: FnMut(T) -> Result<R, StageError>,
    {
        let mut summary = MapSummary::empty();
        for item in items {
            self.check_cancelled()?;
            let id = label(&item);
            monitor.start_item(&id);
            match f(item) {
                Ok(result) => {
                    summary.results.push(result);
                    monitor.finish_item(true);
                }
                Err(StageError::Cancelled) => return Err(StageError::Cancelled),
                Err(err) if self.debug => return Err(err),
                Err(err) => {
                    summary.failures.push(MapFailure {
                        item: id,
                        error: err.to_string(),
                    });
                    monitor.finish_item(false);
                }
            }
            summary.processed += 1;
        }
        Ok(summary)
    }

    fn report_failures<R>(&self, summary: &MapSummary<R>) {
        let rate = summary.error_rate();
        if rate > 0.1 {
            self.logger
                .warn(&format!("{:.0}% of iterations had errors.", rate * 100.0));
            self.logger.warn("See the log for errors.");
        }
        if !summary.failures.is_empty() {
            self.logger
                .warn(&format!("Trapped {} errors", summary.failures.len()));
            for failure in &summary.failures {
                self.logger
                    .debug(&format!("Error {} caught on {}", failure.error, failure.item));
            }
        }
    }
}
