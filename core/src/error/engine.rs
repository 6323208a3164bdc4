use thiserror::Error;

use super::{CacheError, ConfigError};

/// Errors raised by the engine itself (registry, lifecycle, walk).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cannot register stage '{0}': the engine has already started")]
    RegistrationClosed(String),

    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("invalid stage name: {0:?}")]
    InvalidStageName(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine has already been configured")]
    AlreadyConfigured,

    #[error("engine run has already finished, reset it before running again")]
    RunFinished,

    #[error("stage '{0}' does not exist")]
    UnknownStage(String),

    #[error("no stages triggered to run")]
    NoStagesSelected,

    #[error("error {kind} in stage {stage}: {message}")]
    StageFailed {
        stage: String,
        kind: String,
        message: String,
    },

    #[error("interrupted during stage '{stage}'")]
    Cancelled { stage: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl EngineError {
    /// Lifecycle misuse: never retried, surfaced to the caller as-is.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::RegistrationClosed(_)
                | Self::DuplicateStage(_)
                | Self::AlreadyRunning
                | Self::AlreadyConfigured
                | Self::RunFinished
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        // 2: usage (nothing selected, unknown stage)
        // 11: configuration
        // 40: state error
        // 50: unhandled stage failure / cache
        // 130: user interrupt
        match self {
            Self::NoStagesSelected | Self::UnknownStage(_) | Self::InvalidStageName(_) => 2,
            Self::Config(_) => 11,
            Self::StageFailed { .. } | Self::Cache(_) => 50,
            Self::Cancelled { .. } => 130,
            Self::RegistrationClosed(_)
            | Self::DuplicateStage(_)
            | Self::AlreadyRunning
            | Self::AlreadyConfigured
            | Self::RunFinished => 40,
        }
    }
}
