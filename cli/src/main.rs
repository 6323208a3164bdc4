use std::sync::Arc;

use stagewalk_cli::{app, pipeline};
use stagewalk_core::api::{
    load_config, Configuration, ConsoleSwitch, Engine, LoggingConfig, StageLogger, TracingLogger,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let console = ConsoleSwitch::default();
    let logger = Arc::new(TracingLogger::new(console.clone()));

    let exit = match real_main(logger.clone(), console.clone()).await {
        Ok(code) => code,
        Err(e) => {
            // Failures before configuration still need a subscriber to land in.
            if !tracing::dispatcher::has_been_set() {
                let fallback = LoggingConfig::default();
                if let Err(err) = init_tracing(&fallback, &Configuration::new(), console) {
                    eprintln!("{err}");
                }
            }
            logger.start();
            app::report_fatal(logger.as_ref(), &e)
        }
    };

    std::process::exit(exit);
}

async fn real_main(logger: Arc<TracingLogger>, console: ConsoleSwitch) -> anyhow::Result<i32> {
    let mut engine = Engine::new("stagewalk", logger.clone());
    pipeline::register(&mut engine)?;

    let (args, request) = match app::parse_args(&engine, std::env::args()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    let mut cfg = load_config(args.config_file.as_deref())?;
    app::apply_overrides(&mut cfg, &args)?;
    init_tracing(&cfg.logging()?, &cfg, console).map_err(anyhow::Error::msg)?;

    app::write_dumps(&cfg, &args)?;
    engine.configure(cfg)?;
    pipeline::register_caches(engine.cache())?;

    if args.list_stages {
        engine.startup()?;
        logger.info(&engine.list_stages());
        return Ok(0);
    }

    app::install_report_hooks(&mut engine, &args);
    engine.set_progress_bars(atty::is(atty::Stream::Stderr));

    let token = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received");
            token.cancel();
        }
    });

    let code = tokio::task::block_in_place(|| app::run_engine(&mut engine, request))?;
    Ok(code)
}

fn init_tracing(
    logging: &LoggingConfig,
    cfg: &Configuration,
    console: ConsoleSwitch,
) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| cfg.get_str("Dirs.Logs"))
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("stagewalk"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("stagewalk.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    // Progress bars switch the console layer off while they draw.
    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .with_filter(tracing_subscriber::filter::filter_fn(move |_| {
                console.is_enabled()
            }))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
