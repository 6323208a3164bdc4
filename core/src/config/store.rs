use std::path::Path;

use toml::{Table, Value};

use super::types::LoggingConfig;
use crate::error::ConfigError;

const DEFAULTS: &str = include_str!("defaults.toml");

/// Nested configuration addressed by dotted key paths (`Dirs.Caches`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    table: Table,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: Table) -> Self {
        Self { table }
    }

    /// The built-in defaults shipped with the engine.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::parse(DEFAULTS, Path::new("<defaults>"))
    }

    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let table = text
            .parse::<Table>()
            .map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let first = parts.next()?;
        let mut current = self.table.get(first)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Missing or non-boolean values read as `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// A string list; a bare string is treated as a one-element list.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Set `key`, creating intermediate tables as needed.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let parts = split_key(key)?;
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| ConfigError::InvalidKey(key.to_string()))?;

        let mut current = &mut self.table;
        for part in parents {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            current = entry
                .as_table_mut()
                .ok_or_else(|| ConfigError::NotATable {
                    key: key.to_string(),
                })?;
        }
        current.insert(last.to_string(), value.into());
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let parts = split_key(key).ok()?;
        let (last, parents) = parts.split_last()?;
        let mut current = &mut self.table;
        for part in parents {
            current = current.get_mut(*part)?.as_table_mut()?;
        }
        current.remove(*last)
    }

    /// Append to a string list, creating it when missing.
    pub fn push_str(&mut self, key: &str, item: &str) -> Result<(), ConfigError> {
        let mut list: Vec<Value> = match self.get(key) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(s)) => vec![Value::String(s.clone())],
            _ => Vec::new(),
        };
        list.push(Value::String(item.to_string()));
        self.set(key, Value::Array(list))
    }

    /// Deep merge: tables merge key by key, every other value is replaced.
    pub fn merge(&mut self, other: &Table) {
        merge_tables(&mut self.table, other);
    }

    /// Merge a file on top of this configuration. Returns `false` when the
    /// file does not exist.
    pub fn load_file(&mut self, path: &Path) -> Result<bool, ConfigError> {
        if !path.exists() {
            return Ok(false);
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded = Self::parse(&text, path)?;
        self.merge(&loaded.table);
        Ok(true)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self.table)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.to_toml_string()?;
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A copy without the given top-level sections.
    pub fn without(&self, sections: &[&str]) -> Self {
        let mut table = self.table.clone();
        for section in sections {
            table.remove(*section);
        }
        Self { table }
    }

    pub fn logging(&self) -> Result<LoggingConfig, ConfigError> {
        match self.get("Logging") {
            Some(value) => value
                .clone()
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::InvalidValue {
                    key: "Logging".to_string(),
                    message: e.to_string(),
                }),
            None => Ok(LoggingConfig::default()),
        }
    }
}

fn split_key(key: &str) -> Result<Vec<&str>, ConfigError> {
    let parts: Vec<&str> = key.split('.').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidKey(key.to_string()));
    }
    Ok(parts)
}

fn merge_tables(base: &mut Table, update: &Table) {
    for (key, value) in update {
        match (base.get_mut(key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Parse a command-line value as a TOML literal, falling back to the raw
/// string when it does not parse.
///
/// `3` becomes an integer, `'text'` a string, `[1, 2]` an array and
/// `plain words` the string `"plain words"`.
pub fn parse_literal(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains('\n') {
        return Value::String(text.to_string());
    }
    match format!("literal = {trimmed}").parse::<Table>() {
        Ok(mut table) => table
            .remove("literal")
            .unwrap_or_else(|| Value::String(text.to_string())),
        Err(_) => Value::String(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let cfg = Configuration::defaults().unwrap();
        assert_eq!(cfg.get_str_list("Default"), vec!["all".to_string()]);
        assert!(!cfg.get_bool("Debug"));
        assert!(!cfg.get_bool("Options.DryRun"));
        assert_eq!(cfg.get_str("Dirs.Caches"), Some("Caches"));
        assert!(cfg.get_str_list("Options.macro").is_empty());
    }

    #[test]
    fn test_dotted_set_and_get() {
        let mut cfg = Configuration::new();
        cfg.set("Option.Key.Deep", 3).unwrap();
        assert_eq!(cfg.get("Option.Key.Deep").and_then(Value::as_integer), Some(3));
        assert!(cfg.get("Option.Key").unwrap().is_table());
        assert!(cfg.get("Option.Missing").is_none());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut cfg = Configuration::new();
        cfg.set("Debug", true).unwrap();
        let err = cfg.set("Debug.Inner", 1).unwrap_err();
        assert!(matches!(err, ConfigError::NotATable { .. }));
        assert!(matches!(
            cfg.set("a..b", 1).unwrap_err(),
            ConfigError::InvalidKey(_)
        ));
    }

    #[test]
    fn test_remove_and_push() {
        let mut cfg = Configuration::defaults().unwrap();
        cfg.push_str("Options.macro", "reduce").unwrap();
        cfg.push_str("Options.macro", "plot").unwrap();
        assert_eq!(
            cfg.get_str_list("Options.macro"),
            vec!["reduce".to_string(), "plot".to_string()]
        );
        assert!(cfg.remove("Options.macro").is_some());
        assert!(cfg.get_str_list("Options.macro").is_empty());
    }

    #[test]
    fn test_deep_merge() {
        let mut cfg = Configuration::defaults().unwrap();
        let update = Configuration::parse(
            "Default = [\"reduce\"]\n[Dirs]\nCaches = \"/tmp/c\"\n",
            Path::new("inline"),
        )
        .unwrap();
        cfg.merge(update.table());
        assert_eq!(cfg.get_str("Dirs.Caches"), Some("/tmp/c"));
        assert_eq!(cfg.get_str("Dirs.Logs"), Some("Logs"));
        assert_eq!(cfg.get_str_list("Default"), vec!["reduce".to_string()]);
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("3"), Value::Integer(3));
        assert_eq!(parse_literal("2.5"), Value::Float(2.5));
        assert_eq!(parse_literal("true"), Value::Boolean(true));
        assert_eq!(parse_literal("'quoted'"), Value::String("quoted".into()));
        assert_eq!(
            parse_literal("[1, 2]"),
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(parse_literal("plain words"), Value::String("plain words".into()));
        assert_eq!(parse_literal("a = b"), Value::String("a = b".into()));
    }

    #[test]
    fn test_without_and_logging() {
        let cfg = Configuration::defaults().unwrap();
        let trimmed = cfg.without(&["Options"]);
        assert!(!trimmed.contains("Options"));
        assert!(trimmed.contains("Dirs"));

        let logging = cfg.logging().unwrap();
        assert!(logging.enabled);
        assert_eq!(logging.level, "info");
    }
}
