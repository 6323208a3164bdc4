//! CLI assembly: apply command-line overrides to the configuration, wire
//! report hooks, and drive the engine.
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use stagewalk_core::api::{
    dump_path, parse_literal, split_selector_args, ConfigError, Configuration, Engine,
    EngineError, ExecutionRequest, RunStatus, StageLogger,
};

use crate::commands::cli::Args;

/// Selector help appended to `--help`.
pub fn stage_help(engine: &Engine) -> String {
    let mut text = String::from("Stages:");
    for stage in engine.registry().iter() {
        let help = stage.help().unwrap_or(stage.description());
        text.push_str(&format!("\n  *{:<20} {}", stage.name(), help));
    }
    text
}

/// Split stage selectors out of `argv`, then parse the rest with clap.
pub fn parse_args<I, S>(engine: &Engine, argv: I) -> Result<(Args, ExecutionRequest), clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let registry = engine.registry();
    let (selectors, rest) = split_selector_args(argv, &|name: &str| registry.contains(name));
    let matches = Args::command()
        .after_help(stage_help(engine))
        .try_get_matches_from(rest)?;
    let args = Args::from_arg_matches(&matches)?;
    Ok((args, ExecutionRequest::from_selectors(selectors)))
}

/// Fold command-line flags into the configuration.
pub fn apply_overrides(cfg: &mut Configuration, args: &Args) -> Result<(), ConfigError> {
    for assignment in &args.configure {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidValue {
                key: assignment.clone(),
                message: "expected KEY=VALUE".to_string(),
            })?;
        cfg.set(key.trim(), parse_literal(value))?;
    }
    if args.dry_run {
        cfg.set("Options.DryRun", true)?;
    }
    if args.debug {
        cfg.set("Debug", true)?;
    }
    if args.no_cache {
        cfg.set("Cache.Use", false)?;
    }
    if args.clean_cache {
        cfg.set("Cache.Clear", true)?;
    }
    Ok(())
}

fn config_file(cfg: &Configuration) -> PathBuf {
    cfg.get_str("Configurations.This")
        .or_else(|| cfg.get_str("Configurations.Main"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("stagewalk.main.config.toml"))
}

/// Handle `--dump-config` and `--dump-full-raw`. Returns the files written.
pub fn write_dumps(cfg: &Configuration, args: &Args) -> Result<Vec<PathBuf>, ConfigError> {
    let base = config_file(cfg);
    let mut written = Vec::new();
    if args.dump_config {
        let path = dump_path(&base, "dump");
        cfg.without(&["Options"]).save(&path)?;
        tracing::info!(path = %path.display(), "configuration dumped");
        written.push(path);
    }
    if args.dump_full_raw {
        let path = dump_path(&base, "fdump");
        cfg.save(&path)?;
        tracing::info!(path = %path.display(), "full configuration dumped");
        written.push(path);
    }
    Ok(written)
}

/// Register the end-of-run reports requested on the command line.
pub fn install_report_hooks(engine: &mut Engine, args: &Args) {
    if args.show_tree {
        engine.on_exit(|e| e.logger().info(&e.dep_tree()));
    }
    if args.show_stages {
        engine.on_exit(|e| e.logger().info(&e.done_stages()));
    }
    if args.profile {
        engine.on_exit(|e| e.logger().info(&e.profile().render(true)));
    }
    if args.print_profile {
        engine.on_exit(|e| println!("{}", e.profile().render(false)));
    }
}

/// Run the engine to completion and exit it with the matching code.
pub fn run_engine(engine: &mut Engine, request: ExecutionRequest) -> Result<i32, EngineError> {
    match engine.run(request) {
        Ok(RunStatus::Completed) => {
            engine.exit(0);
            Ok(0)
        }
        Ok(RunStatus::Paused) => {
            engine.logger().info("Run paused before completion");
            engine.exit(0);
            Ok(0)
        }
        Err(err) => {
            engine.exit(err.exit_code());
            Err(err)
        }
    }
}

pub fn exit_code_for_error(e: &anyhow::Error) -> i32 {
    // 0: success
    // 2: usage (nothing selected, unknown stage)
    // 11: config error
    // 40: engine state error
    // 50: unhandled stage failure / internal
    // 130: interrupted
    if let Some(engine_err) = e.downcast_ref::<EngineError>() {
        return engine_err.exit_code();
    }
    if e.downcast_ref::<ConfigError>().is_some() {
        return 11;
    }
    50
}

/// Log a fatal error at critical level and pick the process exit code.
pub fn report_fatal(logger: &dyn StageLogger, e: &anyhow::Error) -> i32 {
    let code = exit_code_for_error(e);
    logger.set_console(true);
    logger.critical(&format!("stagewalk failed: {e:#}"));
    code
}
