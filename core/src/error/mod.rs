pub mod cache;
pub mod config;
pub mod engine;
pub mod stage;

pub use cache::CacheError;
pub use config::ConfigError;
pub use engine::EngineError;
pub use stage::StageError;
