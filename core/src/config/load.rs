use std::path::{Path, PathBuf};

use super::store::Configuration;
use crate::error::ConfigError;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "STAGEWALK_CONFIG";

/// Load the effective configuration.
///
/// Priority for the file path: explicit `path`, then `$STAGEWALK_CONFIG`,
/// then `Configurations.Main` from the defaults. A missing file is not an
/// error; the defaults are used as-is.
pub fn load_config(path: Option<&Path>) -> Result<Configuration, ConfigError> {
    let mut cfg = Configuration::defaults()?;

    let file = match path {
        Some(p) => Some(p.to_path_buf()),
        None => std::env::var(CONFIG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| cfg.get_str("Configurations.Main").map(PathBuf::from)),
    };

    if let Some(file) = file {
        let loaded = cfg.load_file(&file)?;
        tracing::debug!(path = %file.display(), loaded, "configuration file");
        cfg.set("Configurations.This", file.to_string_lossy().to_string())?;
    }

    Ok(cfg)
}

/// `stagewalk.main.config.toml` + `dump` → `stagewalk.main.config.dump.toml`.
pub fn dump_path(config_file: &Path, suffix: &str) -> PathBuf {
    let name = config_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "stagewalk".to_string());
    let stem = name.strip_suffix(".toml").unwrap_or(&name);
    config_file.with_file_name(format!("{stem}.{suffix}.toml"))
}
