use std::path::PathBuf;

use clap::Parser;

/// Run a dependency-aware stage pipeline.
///
/// Stages are selected with `*name` (run with dependencies), `+name` (run
/// without dependencies) and `-name` (never run). With no selector the
/// configured `Default` macros run.
#[derive(Parser, Debug, Default)]
#[command(name = "stagewalk", version, about)]
pub struct Args {
    /// Walk and trace the selected stages without running them.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print every registered stage and exit.
    #[arg(long)]
    pub list_stages: bool,

    /// Log the dependency tree after the run.
    #[arg(long)]
    pub show_tree: bool,

    /// Log the stages that finished, in order.
    #[arg(long)]
    pub show_stages: bool,

    /// Log the timing profile after the run.
    #[arg(short = 'p', long)]
    pub profile: bool,

    /// Print a plain timing profile to stdout after the run.
    #[arg(long)]
    pub print_profile: bool,

    /// Write the configuration, without command-line options, next to the
    /// configuration file.
    #[arg(long)]
    pub dump_config: bool,

    /// Write the full configuration next to the configuration file.
    #[arg(long)]
    pub dump_full_raw: bool,

    /// Set one configuration value, e.g. `Dirs.Caches='out/cache'`.
    /// Can be specified multiple times.
    #[arg(long, value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub configure: Vec<String>,

    #[arg(short = 'c', long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Re-raise acceptable stage errors and keep console logging on.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Do not load or save caches.
    #[arg(long)]
    pub no_cache: bool,

    /// Delete cached files before running.
    #[arg(long)]
    pub clean_cache: bool,
}
