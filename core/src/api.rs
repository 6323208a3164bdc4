//! Stable re-exports for consumers (`cli` and external crates).
//!
//! Prefer importing from `stagewalk_core::api` instead of reaching into internal modules.

pub use crate::cache::{CacheManager, Generate, Load, Save};
pub use crate::config::{
    dump_path, load_config, parse_literal, Configuration, LoggingConfig, CONFIG_ENV,
};
pub use crate::error::{CacheError, ConfigError, EngineError, StageError};
pub use crate::executor::{
    format_hms, normalize_name, parse_selector, split_selector_args, CancelToken, Engine,
    EnginePhase, Excepts, ExecutionRequest, ExecutionState, ExitHook, MapFailure, MapSummary,
    Profile, ProfileRow, RunRecord, RunStatus, Selector, Stage, StageContext, StageKind,
    StageRegistry, StageSpec, StageStatus, TraceEntry, VisitReason, ALL, NONE,
};
pub use crate::logging::{
    ConsoleSwitch, LogLevel, LogRecord, MemoryLogger, StageLogger, TracingLogger,
};
