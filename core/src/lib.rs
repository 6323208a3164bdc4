//! Dependency-aware stage orchestration.
//!
//! Register named stages on an [`executor::Engine`], then run a selection of
//! them. Dependencies are walked depth-first and every stage runs at most
//! once per run.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
