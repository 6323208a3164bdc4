use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Local};
use regex::Regex;

use super::context::StageContext;
use super::state::StageStatus;
use crate::error::{EngineError, StageError};

/// Name of the built-in macro collecting every `include` stage.
pub const ALL: &str = "all";
/// Name of the built-in empty macro.
pub const NONE: &str = "none";

pub type StageBody = Box<dyn Fn(&mut StageContext<'_>) -> Result<(), StageError>>;

pub enum StageKind {
    /// No body: completing the stage only means its dependencies were walked.
    Macro,
    Body(StageBody),
}

impl fmt::Debug for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Macro => f.write_str("Macro"),
            Self::Body(_) => f.write_str("Body(..)"),
        }
    }
}

/// Error kinds a stage declares as acceptable failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Excepts {
    #[default]
    Nothing,
    Any,
    Kinds(Vec<String>),
}

impl Excepts {
    pub fn kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Kinds(kinds.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, kind: &str) -> bool {
        match self {
            Self::Nothing => false,
            Self::Any => true,
            Self::Kinds(kinds) => kinds.iter().any(|k| k == kind),
        }
    }
}

/// Everything needed to register one stage.
#[derive(Debug)]
pub struct StageSpec {
    pub name: String,
    pub kind: StageKind,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    pub replaces: Vec<String>,
    pub triggers: Vec<String>,
    pub optional: bool,
    pub excepts: Excepts,
    /// Add this stage to the dependencies of `*all`.
    pub include: bool,
    pub help: Option<String>,
}

impl StageSpec {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut StageContext<'_>) -> Result<(), StageError> + 'static,
    {
        Self::with_kind(name, StageKind::Body(Box::new(body)))
    }

    pub fn macro_stage(name: impl Into<String>) -> Self {
        Self::with_kind(name, StageKind::Macro)
    }

    fn with_kind(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            dependencies: Vec::new(),
            replaces: Vec::new(),
            triggers: Vec::new(),
            optional: false,
            excepts: Excepts::Nothing,
            include: false,
            help: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn replaces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replaces.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn triggers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn excepts(mut self, excepts: Excepts) -> Self {
        self.excepts = excepts;
        self
    }

    pub fn include(mut self) -> Self {
        self.include = true;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Per-run bookkeeping, written only by the engine's run loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRecord {
    pub status: StageStatus,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct Stage {
    name: String,
    kind: StageKind,
    description: String,
    dependencies: Vec<String>,
    replaces: Vec<String>,
    triggers: Vec<String>,
    optional: bool,
    excepts: Excepts,
    help: Option<String>,
    pub(crate) record: RunRecord,
}

impl Stage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    pub fn is_macro(&self) -> bool {
        matches!(self.kind, StageKind::Macro)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn replaces(&self) -> &[String] {
        &self.replaces
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn optional(&self) -> bool {
        self.optional
    }

    pub fn excepts(&self) -> &Excepts {
        &self.excepts
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.\-]*$").expect("stage name pattern is valid")
    })
}

/// Normalise a user-facing stage name (`reduce_frames` → `reduce-frames`).
pub fn normalize_name(name: &str) -> String {
    name.trim().replace('_', "-")
}

/// Stage definitions in declaration order.
#[derive(Debug)]
pub struct StageRegistry {
    stages: HashMap<String, Stage>,
    order: Vec<String>,
    sealed: bool,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StageRegistry {
    /// A registry holding the built-in `all` and `none` macros.
    pub fn new() -> Self {
        let mut registry = Self {
            stages: HashMap::new(),
            order: Vec::new(),
            sealed: false,
        };
        registry.insert(
            StageSpec::macro_stage(ALL)
                .description("Run all stages")
                .help("Run all stages"),
        );
        registry.insert(
            StageSpec::macro_stage(NONE)
                .description("Run no stages")
                .help("Run no stages"),
        );
        registry
    }

    pub fn register(&mut self, spec: StageSpec) -> Result<(), EngineError> {
        let name = normalize_name(&spec.name);
        if self.sealed {
            return Err(EngineError::RegistrationClosed(name));
        }
        if !name_pattern().is_match(&name) {
            return Err(EngineError::InvalidStageName(spec.name));
        }
        if self.stages.contains_key(&name) {
            return Err(EngineError::DuplicateStage(name));
        }

        let include = spec.include;
        self.insert(StageSpec { name: name.clone(), ..spec });
        if include {
            if let Some(all) = self.stages.get_mut(ALL) {
                all.dependencies.push(name);
            }
        }
        Ok(())
    }

    fn insert(&mut self, spec: StageSpec) {
        let is_macro = matches!(spec.kind, StageKind::Macro);
        let description = match spec.description {
            Some(d) if !d.trim().is_empty() => d,
            _ if is_macro => spec.name.clone(),
            _ => format!("Running {}", spec.name),
        };
        let stage = Stage {
            name: spec.name.clone(),
            kind: spec.kind,
            description,
            dependencies: spec.dependencies.iter().map(|d| normalize_name(d)).collect(),
            replaces: spec.replaces.iter().map(|d| normalize_name(d)).collect(),
            triggers: spec.triggers.iter().map(|d| normalize_name(d)).collect(),
            optional: spec.optional,
            excepts: spec.excepts,
            help: spec.help,
            record: RunRecord::default(),
        };
        self.order.push(spec.name.clone());
        self.stages.insert(spec.name, stage);
    }

    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Stage> {
        self.stages.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Stage names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.order.iter().filter_map(|name| self.stages.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn move_to_end(&mut self, name: &str) {
        if let Some(pos) = self.order.iter().position(|n| n == name) {
            let moved = self.order.remove(pos);
            self.order.push(moved);
        }
    }

    pub(crate) fn reset_records(&mut self) {
        for stage in self.stages.values_mut() {
            stage.record = RunRecord::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut StageContext<'_>) -> Result<(), StageError> {
        Ok(())
    }

    #[test]
    fn test_builtins_present() {
        let registry = StageRegistry::new();
        assert_eq!(registry.names(), &["all".to_string(), "none".to_string()]);
        assert!(registry.get(ALL).unwrap().is_macro());
        assert_eq!(registry.get(NONE).unwrap().description(), "Run no stages");
    }

    #[test]
    fn test_register_defaults() {
        let mut registry = StageRegistry::new();
        registry
            .register(StageSpec::new("reduce_frames", noop).depends_on(["load_data"]))
            .unwrap();
        registry.register(StageSpec::macro_stage("ex")).unwrap();

        let stage = registry.get("reduce-frames").unwrap();
        assert_eq!(stage.description(), "Running reduce-frames");
        assert_eq!(stage.dependencies(), &["load-data".to_string()]);
        assert!(!stage.is_macro());
        assert_eq!(registry.get("ex").unwrap().description(), "ex");
        assert_eq!(registry.names().last().map(String::as_str), Some("ex"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = StageRegistry::new();
        registry.register(StageSpec::new("a", noop)).unwrap();
        let err = registry.register(StageSpec::new("a", noop)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateStage(name) if name == "a"));
        assert!(matches!(
            registry.register(StageSpec::macro_stage("all")),
            Err(EngineError::DuplicateStage(_))
        ));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = StageRegistry::new();
        for bad in ["", "*star", "-dash", "has space", "+plus"] {
            assert!(matches!(
                registry.register(StageSpec::new(bad, noop)),
                Err(EngineError::InvalidStageName(_))
            ));
        }
    }

    #[test]
    fn test_sealed_registry() {
        let mut registry = StageRegistry::new();
        registry.seal();
        assert!(matches!(
            registry.register(StageSpec::new("late", noop)),
            Err(EngineError::RegistrationClosed(_))
        ));
    }

    #[test]
    fn test_include_adds_to_all() {
        let mut registry = StageRegistry::new();
        registry.register(StageSpec::new("a", noop).include()).unwrap();
        registry.register(StageSpec::new("b", noop)).unwrap();
        registry.register(StageSpec::new("c", noop).include()).unwrap();
        assert_eq!(
            registry.get(ALL).unwrap().dependencies(),
            &["a".to_string(), "c".to_string()]
        );

        registry.move_to_end(ALL);
        assert_eq!(registry.names().last().map(String::as_str), Some(ALL));
    }

    #[test]
    fn test_excepts() {
        assert!(!Excepts::Nothing.accepts("IoError"));
        assert!(Excepts::Any.accepts("IoError"));
        let kinds = Excepts::kinds(["ValueError", "IoError"]);
        assert!(kinds.accepts("IoError"));
        assert!(!kinds.accepts("KeyError"));
    }
}
