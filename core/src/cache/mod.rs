//! Memoising cache that stage bodies can use for expensive intermediates.
//!
//! Each entry has a generator and optional load/save hooks. `get` tries the
//! loader first (when loading is enabled), falls back to generating and then
//! saves the fresh value (when saving is enabled). The engine never touches
//! caches itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Configuration;
use crate::error::CacheError;

pub type Generate = Box<dyn Fn() -> Result<Value, CacheError>>;
pub type Load = Box<dyn Fn() -> Result<Value, CacheError>>;
pub type Save = Box<dyn Fn(&Value) -> Result<(), CacheError>>;

struct CacheEntry {
    generate: Generate,
    load: Option<Load>,
    save: Option<Save>,
    file: Option<PathBuf>,
    value: Option<Value>,
    loaded: bool,
}

pub struct CacheManager {
    entries: BTreeMap<String, CacheEntry>,
    directory: PathBuf,
    loading: bool,
    saving: bool,
}

impl CacheManager {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            entries: BTreeMap::new(),
            directory: directory.into(),
            loading: true,
            saving: true,
        }
    }

    /// Directory from `Dirs.Caches`; `Cache.Use = false` disables load/save.
    pub fn from_config(cfg: &Configuration) -> Self {
        let mut cache = Self::new("Caches");
        cache.apply_config(cfg);
        cache
    }

    /// Re-read directory and flags. Entries registered earlier keep their
    /// file paths.
    pub fn apply_config(&mut self, cfg: &Configuration) {
        if let Some(directory) = cfg.get_str("Dirs.Caches") {
            self.directory = PathBuf::from(directory);
        }
        let enabled = cfg
            .get("Cache.Use")
            .and_then(toml::Value::as_bool)
            .unwrap_or(true);
        self.set_loading(enabled);
        self.set_saving(enabled);
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_loading(&mut self, enabled: bool) {
        self.loading = enabled;
    }

    pub fn set_saving(&mut self, enabled: bool) {
        self.saving = enabled;
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn register(
        &mut self,
        key: &str,
        generate: Generate,
        load: Option<Load>,
        save: Option<Save>,
    ) -> Result<(), CacheError> {
        self.insert(key, generate, load, save, None)
    }

    /// Register an entry persisted as `<directory>/<key>.json`.
    pub fn register_json_file(&mut self, key: &str, generate: Generate) -> Result<(), CacheError> {
        let path = self.directory.join(format!("{}.json", file_stem(key)));

        let load_path = path.clone();
        let load: Load = Box::new(move || {
            let text = std::fs::read_to_string(&load_path).map_err(|source| CacheError::Io {
                path: load_path.clone(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| CacheError::Json {
                path: load_path.clone(),
                source,
            })
        });

        let save_path = path.clone();
        let save: Save = Box::new(move |value| {
            if let Some(parent) = save_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let text = serde_json::to_string_pretty(value).map_err(|source| CacheError::Json {
                path: save_path.clone(),
                source,
            })?;
            std::fs::write(&save_path, text).map_err(|source| CacheError::Io {
                path: save_path.clone(),
                source,
            })
        });

        self.insert(key, generate, Some(load), Some(save), Some(path))
    }

    fn insert(
        &mut self,
        key: &str,
        generate: Generate,
        load: Option<Load>,
        save: Option<Save>,
        file: Option<PathBuf>,
    ) -> Result<(), CacheError> {
        if self.entries.contains_key(key) {
            return Err(CacheError::AlreadyRegistered(key.to_string()));
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                generate,
                load,
                save,
                file,
                value: None,
                loaded: false,
            },
        );
        Ok(())
    }

    pub fn get(&mut self, key: &str) -> Result<&Value, CacheError> {
        let loading = self.loading;
        let saving = self.saving;
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotRegistered(key.to_string()))?;

        if let Some(value) = entry.value.take() {
            return Ok(entry.value.insert(value));
        }

        let mut value = None;
        if loading {
            if let Some(load) = entry.load.as_ref() {
                match load() {
                    Ok(v) => {
                        entry.loaded = true;
                        value = Some(v);
                    }
                    Err(e) => {
                        tracing::debug!(cache = %key, error = %e, "cache load failed, regenerating")
                    }
                }
            }
        }

        let value = match value {
            Some(v) => v,
            None => {
                let fresh = (entry.generate)()?;
                if saving {
                    if let Some(save) = entry.save.as_ref() {
                        save(&fresh)?;
                    }
                }
                fresh
            }
        };

        Ok(entry.value.insert(value))
    }

    /// Whether the value currently held for `key` came from its loader.
    pub fn did_load(&self, key: &str) -> bool {
        self.entries.get(key).map(|e| e.loaded).unwrap_or(false)
    }

    /// Forget memoised values and delete file-backed entries.
    pub fn clear(&mut self) -> Result<(), CacheError> {
        for entry in self.entries.values_mut() {
            entry.value = None;
            entry.loaded = false;
            if let Some(path) = entry.file.as_ref() {
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(CacheError::Io {
                            path: path.clone(),
                            source,
                        })
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("directory", &self.directory)
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("loading", &self.loading)
            .field("saving", &self.saving)
            .finish()
    }
}

fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
