use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache '{0}' is not registered")]
    NotRegistered(String),

    #[error("cache '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("cache '{key}' could not be loaded: {message}")]
    Load { key: String, message: String },

    #[error("cache '{key}' could not be generated: {message}")]
    Generate { key: String, message: String },

    #[error("cache '{key}' could not be saved: {message}")]
    Save { key: String, message: String },

    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache file {path} is not valid json: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
