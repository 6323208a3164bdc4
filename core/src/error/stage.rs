use thiserror::Error;

use super::{CacheError, ConfigError};

/// Error returned by a stage body.
///
/// `kind` is what a stage's acceptable-error declaration is matched against.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{kind}: {message}")]
    Failure { kind: String, message: String },

    #[error("cancelled by user")]
    Cancelled,
}

impl StageError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Failure { kind, .. } => kind,
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Failure { message, .. } => message,
            Self::Cancelled => "cancelled by user",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        Self::new("IoError", err.to_string())
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StageError>() {
            Ok(stage_err) => stage_err,
            Err(other) => Self::new("Error", format!("{other:#}")),
        }
    }
}

impl From<ConfigError> for StageError {
    fn from(err: ConfigError) -> Self {
        Self::new("ConfigError", err.to_string())
    }
}

impl From<CacheError> for StageError {
    fn from(err: CacheError) -> Self {
        Self::new("CacheError", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_message() {
        let err = StageError::new("ValueError", "bad input");
        assert_eq!(err.kind(), "ValueError");
        assert_eq!(err.message(), "bad input");
        assert_eq!(err.to_string(), "ValueError: bad input");
        assert!(!err.is_cancelled());
        assert_eq!(StageError::Cancelled.kind(), "Cancelled");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.fits");
        let err: StageError = io.into();
        assert_eq!(err.kind(), "IoError");
        assert!(err.message().contains("missing.fits"));
    }

    #[test]
    fn test_from_anyhow_keeps_stage_error() {
        let inner = anyhow::Error::new(StageError::new("Custom", "kept"));
        let err: StageError = inner.into();
        assert_eq!(err.kind(), "Custom");

        let other: StageError = anyhow::anyhow!("plain failure").into();
        assert_eq!(other.kind(), "Error");
        assert_eq!(other.message(), "plain failure");
    }
}
