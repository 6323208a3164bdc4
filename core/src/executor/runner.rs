use std::time::Instant;

use chrono::Local;

use super::context::StageContext;
use super::engine::Engine;
use super::registry::{Excepts, StageKind};
use super::state::StageStatus;
use crate::error::{EngineError, StageError};

/// What the walker needs to know about a stage before its body runs.
struct Invocation {
    description: String,
    optional: bool,
    excepts: Excepts,
    replaces: Vec<String>,
    triggers: Vec<String>,
}

impl Engine {
    /// Run one stage body and classify the outcome.
    ///
    /// Timing is recorded on every path. Acceptable failures return `Ok`
    /// and leave the stage uncompleted.
    pub(crate) fn invoke_stage(&mut self, name: &str) -> Result<(), EngineError> {
        let Self {
            registry,
            config,
            cache,
            logger,
            cancel,
            state,
            debug,
            progress_bars,
            pause_requested,
            ..
        } = self;

        let stage = registry
            .get(name)
            .ok_or_else(|| EngineError::UnknownStage(name.to_string()))?;
        let StageKind::Body(body) = stage.kind() else {
            return Ok(());
        };
        let invocation = Invocation {
            description: stage.description().to_string(),
            optional: stage.optional(),
            excepts: stage.excepts().clone(),
            replaces: stage.replaces().to_vec(),
            triggers: stage.triggers().to_vec(),
        };

        logger.debug(&format!("Starting '{name}'"));
        logger.info(&invocation.description);
        state.ran.push(name.to_string());

        let started_at = Local::now();
        let clock = Instant::now();
        let result = {
            let mut ctx = StageContext {
                stage: name,
                config,
                cache,
                logger: &**logger,
                cancel,
                pause: pause_requested,
                debug: *debug,
                progress: *progress_bars,
            };
            body(&mut ctx)
        };
        let elapsed = clock.elapsed();

        if let Some(stage) = registry.get_mut(name) {
            stage.record.started_at = Some(started_at);
            stage.record.ended_at = Some(Local::now());
            stage.record.elapsed = elapsed;
        }

        let outcome = self.classify(name, invocation, result);
        self.logger.debug(&format!("Finished '{name}'"));
        outcome
    }

    fn classify(
        &mut self,
        name: &str,
        invocation: Invocation,
        result: Result<(), StageError>,
    ) -> Result<(), EngineError> {
        let err = match result {
            Ok(()) => {
                self.complete_stage(name, &invocation.replaces, &invocation.triggers);
                self.logger.debug(&format!(
                    "Completed '{name}' and {:?}",
                    invocation.replaces
                ));
                if self.cancel.is_cancelled() {
                    return Err(self.interrupted(name));
                }
                return Ok(());
            }
            Err(err) => err,
        };

        self.set_status(name, StageStatus::Failed);
        if err.is_cancelled() || self.cancel.is_cancelled() {
            return Err(self.interrupted(name));
        }

        if invocation.optional || invocation.excepts.accepts(err.kind()) {
            if self.debug {
                self.logger.set_console(true);
            }
            let message = format!(
                "Error {} in stage {}: {}. Stage indicated that this error was not critical. Error: {}",
                err.kind(),
                name,
                invocation.description,
                err.message()
            );
            if invocation.optional {
                self.logger.debug(&message);
                return Ok(());
            }
            self.logger.error(&message);
            if !self.debug {
                return Ok(());
            }
        } else {
            self.logger.set_console(true);
            self.logger.critical(&format!(
                "Error {} in stage {}: '{}'! Error: {}",
                err.kind(),
                name,
                invocation.description,
                err.message()
            ));
        }

        Err(EngineError::StageFailed {
            stage: name.to_string(),
            kind: err.kind().to_string(),
            message: err.message().to_string(),
        })
    }

    /// Mark a stage and everything it replaces as completed, then schedule
    /// its triggers.
    pub(crate) fn complete_stage(&mut self, name: &str, replaces: &[String], triggers: &[String]) {
        self.state.mark_completed(name);
        for replaced in replaces {
            self.state.mark_completed(replaced);
        }
        self.state.done.push(name.to_string());
        for trigger in triggers {
            self.state.enqueue_trigger(trigger);
        }
        self.set_status(name, StageStatus::Completed);
    }

    /// Log a user interrupt and build the error that ends the run.
    pub(crate) fn interrupted(&self, during: &str) -> EngineError {
        self.logger.set_console(true);
        self.logger
            .critical(&format!("Keyboard interrupt during {during}... ending."));
        self.logger.critical(&format!(
            "Last completed stage: {}",
            self.state.last_completed().unwrap_or("none")
        ));
        self.logger.debug(&format!(
            "Stages completed: {}",
            self.state.done().join(", ")
        ));
        EngineError::Cancelled {
            stage: during.to_string(),
        }
    }
}
