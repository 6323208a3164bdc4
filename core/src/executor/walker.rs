use super::engine::{Engine, EnginePhase, RunStatus};
use super::selection::{check_request, resolve, ExecutionRequest};
use super::state::{StageStatus, TraceEntry, VisitReason};
use crate::error::EngineError;

/// Result of visiting one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// The stage was visited; carries whether it was allowed to run.
    Visited(bool),
    /// A pause was requested: unwind without visiting anything else.
    Suspend,
}

impl Engine {
    /// Resolve the request and walk every selected stage.
    ///
    /// A paused engine resumes with its existing state; the request's
    /// selectors are added to the ones already in effect.
    pub fn run(&mut self, request: ExecutionRequest) -> Result<RunStatus, EngineError> {
        match self.phase {
            EnginePhase::Registering => self.startup()?,
            EnginePhase::Ready | EnginePhase::Paused => {}
            EnginePhase::Running => return Err(EngineError::AlreadyRunning),
            EnginePhase::Finished | EnginePhase::Failed => return Err(EngineError::RunFinished),
        }

        if self.phase == EnginePhase::Paused {
            self.logger.debug("Resuming paused run");
            let extra = match check_request(&request, &self.registry) {
                Ok(extra) => extra,
                Err(err) => return Err(self.reject_selection(err)),
            };
            self.selection.extend(&extra);
        } else {
            self.selection = match resolve(&request, &self.config, &self.registry) {
                Ok(selection) => selection,
                Err(err) => return Err(self.reject_selection(err)),
            };
            self.dry_run = self.config.get_bool("Options.DryRun");
            self.debug = self.config.get_bool("Debug");
        }

        self.phase = EnginePhase::Running;
        match self.walk() {
            Ok(true) => {
                self.phase = EnginePhase::Finished;
                Ok(RunStatus::Completed)
            }
            Ok(false) => {
                self.phase = EnginePhase::Paused;
                self.logger.info("Paused, run again to resume");
                Ok(RunStatus::Paused)
            }
            Err(err) => {
                self.phase = EnginePhase::Failed;
                if matches!(err, EngineError::Cancelled { .. }) {
                    self.exit(err.exit_code());
                }
                Err(err)
            }
        }
    }

    /// Log why a request could not be resolved.
    fn reject_selection(&self, err: EngineError) -> EngineError {
        self.logger.set_console(true);
        match &err {
            EngineError::NoStagesSelected => self.logger.critical("No stages triggered to run!"),
            EngineError::UnknownStage(name) => {
                self.logger.critical(&format!("Stage {name} does not exist."))
            }
            other => self.logger.critical(&other.to_string()),
        }
        err
    }

    /// Top-level pass in declaration order. Returns `false` when paused.
    fn walk(&mut self) -> Result<bool, EngineError> {
        let order = self.registry.names().to_vec();
        for name in &order {
            let reason = if self.selection.is_macro(name) {
                VisitReason::Macro
            } else if self.selection.is_include(name) {
                VisitReason::Include
            } else {
                continue;
            };
            if self.execute_stage(name, reason, 0)? == Step::Suspend {
                return Ok(false);
            }
            if !self.drain_triggers()? {
                return Ok(false);
            }
        }
        self.drain_triggers()
    }

    fn drain_triggers(&mut self) -> Result<bool, EngineError> {
        while let Some(name) = self.state.triggered.pop_front() {
            if self.execute_stage(&name, VisitReason::Trigger, 0)? == Step::Suspend {
                if !self.state.is_attempted(&name) && !self.state.is_completed(&name) {
                    self.state.triggered.push_front(name);
                }
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Visit `name`, its dependencies first, running each stage at most once.
    pub(crate) fn execute_stage(
        &mut self,
        name: &str,
        reason: VisitReason,
        depth: usize,
    ) -> Result<Step, EngineError> {
        if self.phase != EnginePhase::Running {
            return Ok(Step::Suspend);
        }
        if self.cancel.is_cancelled() {
            return Err(self.interrupted(name));
        }

        let Some(stage) = self.registry.get(name) else {
            self.logger.set_console(true);
            self.logger.critical(&format!("Stage {name} does not exist."));
            return Err(EngineError::UnknownStage(name.to_string()));
        };
        let dependencies = stage.dependencies().to_vec();
        let replaces = stage.replaces().to_vec();
        let triggers = stage.triggers().to_vec();
        let description = stage.description().to_string();
        let is_macro = stage.is_macro();

        let use_stage = self.selection.use_stage(name);
        if self.state.is_attempted(name) || self.state.is_completed(name) {
            return Ok(Step::Visited(use_stage));
        }
        if !use_stage {
            self.set_status(name, StageStatus::SkippedExcluded);
            return Ok(Step::Visited(false));
        }

        self.state.attempted.insert(name.to_string());
        self.set_status(name, StageStatus::Attempting);
        let depth = if reason.is_top_level() { 0 } else { depth };

        if reason == VisitReason::Include {
            self.logger
                .debug(&format!("Explicitly skipping dependencies of '{name}'"));
        } else {
            for dep in &dependencies {
                if !self.state.is_completed(dep) && !self.state.is_attempted(dep) {
                    let step = self.execute_stage(dep, VisitReason::Dependency, depth + 1)?;
                    if step == Step::Suspend {
                        self.state.attempted.remove(name);
                        self.set_status(name, StageStatus::NotAttempted);
                        return Ok(Step::Suspend);
                    }
                } else {
                    self.state.trace.push(TraceEntry {
                        depth: depth + 1,
                        reason: VisitReason::AlreadyDone,
                        stage: dep.clone(),
                        description: "(done already)".to_string(),
                    });
                }
                if !self.state.is_completed(dep) {
                    let optional = self.registry.get(dep).is_some_and(|d| d.optional());
                    if optional {
                        self.logger
                            .debug(&format!("Stage '{dep}' requested by '{name}' but skipped"));
                    } else {
                        self.logger.warn(&format!(
                            "Stage '{dep}' required by '{name}' but failed to complete."
                        ));
                    }
                }
            }
        }

        self.state.trace.push(TraceEntry {
            depth,
            reason,
            stage: name.to_string(),
            description,
        });

        if is_macro || self.dry_run {
            self.complete_stage(name, &replaces, &triggers);
            return Ok(Step::Visited(use_stage));
        }

        self.invoke_stage(name)?;
        if self.cancel.is_cancelled() {
            return Err(self.interrupted(name));
        }

        if self.pause_requested {
            self.pause_requested = false;
            self.phase = EnginePhase::Paused;
            self.logger.debug(&format!("Pause requested by '{name}'"));
            return Ok(Step::Suspend);
        }
        Ok(Step::Visited(use_stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::executor::{StageContext, StageSpec};
    use crate::logging::MemoryLogger;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn noop(_: &mut StageContext<'_>) -> Result<(), StageError> {
        Ok(())
    }

    fn engine() -> Engine {
        Engine::new("walker", Arc::new(MemoryLogger::new()))
    }

    #[test]
    fn test_diamond_runs_shared_dependency_once() {
        let mut engine = engine();
        engine.register(StageSpec::new("base", noop)).unwrap();
        engine
            .register(StageSpec::new("left", noop).depends_on(["base"]))
            .unwrap();
        engine
            .register(StageSpec::new("right", noop).depends_on(["base"]))
            .unwrap();
        engine
            .register(StageSpec::new("top", noop).depends_on(["left", "right"]))
            .unwrap();

        let status = engine.run(ExecutionRequest::new().with_macro("top")).unwrap();
        assert_eq!(status, RunStatus::Completed);
        assert_eq!(engine.state().ran(), &["base", "left", "right", "top"]);
        assert!(engine
            .state()
            .trace()
            .iter()
            .any(|t| t.reason == VisitReason::AlreadyDone && t.stage == "base"));
    }

    #[test]
    fn test_include_skips_dependencies() {
        let mut engine = engine();
        engine.register(StageSpec::new("a", noop)).unwrap();
        engine
            .register(StageSpec::new("b", noop).depends_on(["a"]))
            .unwrap();

        engine.run(ExecutionRequest::new().with_include("b")).unwrap();
        assert_eq!(engine.state().ran(), &["b"]);
        assert!(!engine.state().is_attempted("a"));
    }

    #[test]
    fn test_second_run_is_state_error() {
        let mut engine = engine();
        engine.register(StageSpec::new("a", noop)).unwrap();
        engine.run(ExecutionRequest::new().with_macro("a")).unwrap();
        assert!(matches!(
            engine.run(ExecutionRequest::new().with_macro("a")),
            Err(EngineError::RunFinished)
        ));

        engine.reset();
        engine.run(ExecutionRequest::new().with_macro("a")).unwrap();
        assert_eq!(engine.state().ran(), &["a"]);
    }

    #[test]
    fn test_unknown_dependency_is_fatal() {
        let mut engine = engine();
        engine
            .register(StageSpec::new("a", noop).depends_on(["ghost"]))
            .unwrap();
        let err = engine.run(ExecutionRequest::new().with_macro("a")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStage(name) if name == "ghost"));
        assert_eq!(engine.phase(), EnginePhase::Failed);
    }
}
