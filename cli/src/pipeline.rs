//! Demonstration pipeline shipped with the binary.
//!
//! `main` and `other` read cached grids, `frames` maps over a batch of
//! frames with a few expected failures, `last` depends on both branches and
//! triggers `report`. The `ex` macro runs the two cached stages.

use serde_json::{json, Value};
use stagewalk_core::api::{
    CacheError, CacheManager, Engine, EngineError, Excepts, StageContext, StageError, StageSpec,
};

pub const IMAGE_CACHE: &str = "Random Image";
pub const GRID_CACHE: &str = "Random Grid";

/// Deterministic pseudo-random grid, standing in for an expensive product.
fn generate_grid(size: usize, seed: u64) -> Value {
    let mut state = seed;
    let rows: Vec<Vec<u64>> = (0..size)
        .map(|_| {
            (0..size)
                .map(|_| {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    (state >> 33) % 100
                })
                .collect()
        })
        .collect();
    json!({ "size": size, "rows": rows })
}

pub fn register_caches(cache: &mut CacheManager) -> Result<(), CacheError> {
    cache.register(
        IMAGE_CACHE,
        Box::new(|| Ok(generate_grid(16, 7))),
        None,
        None,
    )?;
    cache.register_json_file(GRID_CACHE, Box::new(|| Ok(generate_grid(8, 11))))
}

fn corner(value: &Value, row: usize, col: usize) -> Result<u64, StageError> {
    value["rows"][row][col]
        .as_u64()
        .ok_or_else(|| StageError::new("ValueError", format!("no pixel at ({row}, {col})")))
}

fn main_stage(ctx: &mut StageContext<'_>) -> Result<(), StageError> {
    let pixel = corner(ctx.cache().get(IMAGE_CACHE)?, 0, 0)?;
    ctx.logger()
        .info(&format!("Hello from {}, first pixel {pixel}", ctx.stage_name()));
    Ok(())
}

fn other_stage(ctx: &mut StageContext<'_>) -> Result<(), StageError> {
    let pixel = corner(ctx.cache().get(GRID_CACHE)?, 1, 1)?;
    ctx.logger().info(&format!("Hello from other, pixel {pixel}"));
    Ok(())
}

fn frames_stage(ctx: &mut StageContext<'_>) -> Result<(), StageError> {
    let count = ctx
        .config()
        .get("Frames.Count")
        .and_then(|v| v.as_integer())
        .unwrap_or(24)
        .max(0) as u64;
    let summary = ctx.map_collection(
        1..=count,
        |frame| format!("frame-{frame:03}"),
        |frame| {
            if frame % 13 == 0 {
                Err(StageError::new("FrameError", format!("frame {frame} is saturated")))
            } else {
                Ok(frame * 2)
            }
        },
    )?;
    ctx.logger().info(&format!(
        "Reduced {} frames, {} rejected",
        summary.results.len(),
        summary.failures.len()
    ));
    Ok(())
}

fn last_stage(ctx: &mut StageContext<'_>) -> Result<(), StageError> {
    let pixel = corner(ctx.cache().get(IMAGE_CACHE)?, 0, 0)?;
    ctx.logger().info(&format!("Last stage, first pixel {pixel}"));
    Ok(())
}

fn report_stage(ctx: &mut StageContext<'_>) -> Result<(), StageError> {
    let dir = ctx
        .config()
        .get_str("Dirs.Caches")
        .unwrap_or("Caches")
        .to_string();
    let entries = std::fs::read_dir(&dir)?.count();
    ctx.logger()
        .info(&format!("{entries} cached files in {dir}"));
    Ok(())
}

pub fn register(engine: &mut Engine) -> Result<(), EngineError> {
    engine.register(
        StageSpec::new("main", main_stage)
            .description("Main stage")
            .include()
            .help("Read the cached image"),
    )?;
    engine.register(
        StageSpec::new("other", other_stage)
            .description("Other stage")
            .include(),
    )?;
    engine.register(
        StageSpec::new("frames", frames_stage)
            .description("Reduce frames")
            .depends_on(["main"])
            .excepts(Excepts::kinds(["FrameError"]))
            .include(),
    )?;
    engine.register(
        StageSpec::new("last", last_stage)
            .description("Last stage")
            .depends_on(["frames", "other"])
            .triggers(["report"])
            .include(),
    )?;
    engine.register(
        StageSpec::new("report", report_stage)
            .description("Summarise caches")
            .optional()
            .excepts(Excepts::kinds(["IoError"])),
    )?;
    engine.register(
        StageSpec::macro_stage("ex")
            .description("Example macro")
            .depends_on(["main", "other"])
            .help("Example macro"),
    )?;
    Ok(())
}
