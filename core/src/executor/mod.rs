//! Dependency-aware stage executor.
//!
//! Stages are registered once, up front, then a run resolves the requested
//! selectors and walks the dependency graph depth-first, executing each
//! stage at most once.
//!
//! # Architecture
//!
//! ```text
//! StageSpec ──register──▶ StageRegistry          (declaration order)
//!                              │
//! ExecutionRequest ──resolve──▶ Selection         (macro / include / exclude)
//!                              │
//!                   Engine::run → execute_stage   (recursive walk, walker.rs)
//!                              │
//!                        invoke_stage             (one body, runner.rs)
//!                              │
//!              ExecutionState + RunRecord         (trace, timings)
//!                              │
//!                    profile() / dep_tree()       (report.rs)
//! ```

mod cancel;
mod context;
mod engine;
mod progress;
mod registry;
mod report;
mod runner;
mod selection;
mod state;
mod walker;

pub use cancel::CancelToken;
pub use context::{MapFailure, MapSummary, StageContext};
pub use engine::{Engine, EnginePhase, ExitHook, RunStatus};
pub use progress::ProgressMonitor;
pub use registry::{
    normalize_name, Excepts, RunRecord, Stage, StageBody, StageKind, StageRegistry, StageSpec, ALL,
    NONE,
};
pub use report::{format_hms, Profile, ProfileRow};
pub use selection::{
    parse_selector, resolve, split_selector_args, ExecutionRequest, Selection, Selector,
};
pub use state::{ExecutionState, StageStatus, TraceEntry, VisitReason};
