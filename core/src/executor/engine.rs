use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::cancel::CancelToken;
use super::registry::{RunRecord, StageRegistry, StageSpec, ALL};
use super::selection::Selection;
use super::state::{ExecutionState, StageStatus};
use crate::cache::CacheManager;
use crate::config::Configuration;
use crate::error::EngineError;
use crate::logging::StageLogger;

/// Called once when the engine exits, in registration order.
pub type ExitHook = Box<dyn Fn(&Engine)>;

/// Engine lifecycle.
///
/// ```text
/// Registering ──startup──▶ Ready ──run──▶ Running ──▶ Finished | Failed
///                                           │  ▲
///                                    pause  ▼  │ run
///                                          Paused
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Registering,
    Ready,
    Running,
    Paused,
    Finished,
    Failed,
}

/// How a call to [`Engine::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Paused,
}

pub struct Engine {
    name: String,
    pub(crate) registry: StageRegistry,
    pub(crate) config: Configuration,
    pub(crate) cache: CacheManager,
    pub(crate) logger: Arc<dyn StageLogger>,
    pub(crate) cancel: CancelToken,
    pub(crate) phase: EnginePhase,
    configured: bool,
    pub(crate) state: ExecutionState,
    pub(crate) selection: Selection,
    exit_hooks: Vec<ExitHook>,
    exit_code: Option<i32>,
    pub(crate) progress_bars: bool,
    pub(crate) dry_run: bool,
    pub(crate) debug: bool,
    pub(crate) pause_requested: bool,
}

impl Engine {
    /// A fresh engine using the built-in default configuration.
    pub fn new(name: impl Into<String>, logger: Arc<dyn StageLogger>) -> Self {
        let config = Configuration::defaults().unwrap_or_default();
        let cache = CacheManager::from_config(&config);
        Self {
            name: name.into(),
            registry: StageRegistry::new(),
            config,
            cache,
            logger,
            cancel: CancelToken::new(),
            phase: EnginePhase::Registering,
            configured: false,
            state: ExecutionState::new(),
            selection: Selection::default(),
            exit_hooks: Vec::new(),
            exit_code: None,
            progress_bars: false,
            dry_run: false,
            debug: false,
            pause_requested: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&mut self, spec: StageSpec) -> Result<(), EngineError> {
        if self.phase != EnginePhase::Registering {
            return Err(EngineError::RegistrationClosed(spec.name));
        }
        self.registry.register(spec)
    }

    /// Replace the configuration. Allowed once, before any run.
    pub fn configure(&mut self, config: Configuration) -> Result<(), EngineError> {
        if self.configured {
            return Err(EngineError::AlreadyConfigured);
        }
        if matches!(self.phase, EnginePhase::Running | EnginePhase::Paused) {
            return Err(EngineError::AlreadyRunning);
        }
        self.cache.apply_config(&config);
        self.config = config;
        self.configured = true;
        self.logger.debug(&format!(
            "Updated configuration from {}",
            self.config
                .get_str("Configurations.This")
                .unwrap_or("<defaults>")
        ));
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Close registration, flush buffered log output and prepare caches.
    /// Called by the first `run` when not called explicitly.
    pub fn startup(&mut self) -> Result<(), EngineError> {
        if self.phase != EnginePhase::Registering {
            return Ok(());
        }
        self.registry.seal();
        self.registry.move_to_end(ALL);
        self.logger.start();
        self.dry_run = self.config.get_bool("Options.DryRun");
        self.debug = self.config.get_bool("Debug");
        if self.dry_run {
            self.logger.debug("Operating in dry-run mode");
        }

        if self.config.get_bool("Cache.Clear") {
            self.logger.debug("Clearing caches");
            self.cache.clear()?;
        }
        if let Some(path) = self.partials_path() {
            self.config.save(&path)?;
            self.logger
                .debug(&format!("Wrote partial configuration to {}", path.display()));
        }

        self.phase = EnginePhase::Ready;
        self.logger.debug(&format!(
            "{} ready with {} stages",
            self.name,
            self.registry.len()
        ));
        Ok(())
    }

    fn partials_path(&self) -> Option<PathBuf> {
        let dir = Path::new(self.config.get_str("Dirs.Partials")?);
        dir.is_dir()
            .then(|| dir.join(format!("{}.config.toml", self.name)))
    }

    /// Discard all run state so the engine can run again.
    pub fn reset(&mut self) {
        self.state = ExecutionState::new();
        self.selection = Selection::default();
        self.registry.reset_records();
        self.cancel.reset();
        self.pause_requested = false;
        self.exit_code = None;
        self.phase = if self.registry.is_sealed() {
            EnginePhase::Ready
        } else {
            EnginePhase::Registering
        };
    }

    pub fn on_exit<F>(&mut self, hook: F)
    where
        F: Fn(&Engine) + 'static,
    {
        self.exit_hooks.push(Box::new(hook));
    }

    /// Run exit hooks (once) and log how the engine ended.
    pub fn exit(&mut self, code: i32) {
        if self.exit_code.is_some() {
            return;
        }
        self.exit_code = Some(code);
        let this: &Engine = self;
        for hook in &this.exit_hooks {
            hook(this);
        }
        if code == 0 {
            self.logger.info(&format!("{} finished", self.name));
        } else {
            self.logger.set_console(true);
            self.logger
                .critical(&format!("{} exiting abnormally: {}", self.name, code));
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    pub fn cache(&mut self) -> &mut CacheManager {
        &mut self.cache
    }

    pub fn logger(&self) -> &dyn StageLogger {
        self.logger.as_ref()
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Draw progress bars for `map_collection`. Off by default.
    pub fn set_progress_bars(&mut self, enabled: bool) {
        self.progress_bars = enabled;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn stage_record(&self, name: &str) -> Option<&RunRecord> {
        self.registry.get(name).map(|s| s.record())
    }

    pub fn stage_status(&self, name: &str) -> StageStatus {
        self.stage_record(name)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    pub(crate) fn set_status(&mut self, name: &str, status: StageStatus) {
        if let Some(stage) = self.registry.get_mut(name) {
            stage.record.status = status;
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("stages", &self.registry.len())
            .field("configured", &self.configured)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemoryLogger};
    use std::cell::Cell;
    use std::rc::Rc;

    fn engine() -> (Engine, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::new());
        (Engine::new("test", logger.clone()), logger)
    }

    #[test]
    fn test_startup_seals_registry() {
        let (mut engine, logger) = engine();
        engine
            .register(StageSpec::new("a", |_| Ok(())).include())
            .unwrap();
        engine.startup().unwrap();
        assert_eq!(engine.phase(), EnginePhase::Ready);
        assert!(logger.is_started());
        assert_eq!(engine.registry().names().last().map(String::as_str), Some(ALL));
        assert!(matches!(
            engine.register(StageSpec::new("b", |_| Ok(()))),
            Err(EngineError::RegistrationClosed(_))
        ));
    }

    #[test]
    fn test_configure_twice() {
        let (mut engine, _) = engine();
        let mut cfg = Configuration::defaults().unwrap();
        cfg.set("Dirs.Caches", "elsewhere").unwrap();
        engine.configure(cfg.clone()).unwrap();
        assert_eq!(engine.cache().directory(), Path::new("elsewhere"));
        assert!(matches!(
            engine.configure(cfg),
            Err(EngineError::AlreadyConfigured)
        ));
    }

    #[test]
    fn test_exit_runs_hooks_once() {
        let (mut engine, logger) = engine();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        engine.on_exit(move |e| {
            assert_eq!(e.name(), "test");
            seen.set(seen.get() + 1);
        });
        engine.exit(0);
        engine.exit(3);
        assert_eq!(calls.get(), 1);
        assert_eq!(engine.exit_code(), Some(0));
        assert!(logger.contains(LogLevel::Info, "test finished"));
        assert!(!logger.contains(LogLevel::Critical, "exiting abnormally"));
    }

    #[test]
    fn test_exit_abnormal_logs_critical() {
        let (mut engine, logger) = engine();
        engine.exit(2);
        assert!(logger.contains(LogLevel::Critical, "test exiting abnormally: 2"));
    }

    #[test]
    fn test_partials_written() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _) = engine();
        let mut cfg = Configuration::defaults().unwrap();
        cfg.set("Dirs.Partials", dir.path().to_string_lossy().to_string())
            .unwrap();
        engine.configure(cfg).unwrap();
        engine.startup().unwrap();
        assert!(dir.path().join("test.config.toml").exists());
    }
}
