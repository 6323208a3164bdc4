use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::registry::{normalize_name, StageRegistry};
use crate::config::Configuration;
use crate::error::EngineError;

/// One command-line stage selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `*name`: run the stage and expand its dependencies.
    Macro(String),
    /// `+name`: run the stage without expanding its dependencies.
    Include(String),
    /// `-name`: never run the stage.
    Exclude(String),
}

impl Selector {
    pub fn name(&self) -> &str {
        match self {
            Self::Macro(n) | Self::Include(n) | Self::Exclude(n) => n,
        }
    }
}

fn selector_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([*+\-])([A-Za-z0-9][A-Za-z0-9._\-]*)$").expect("selector pattern is valid")
    })
}

/// Parse `*name`, `+name` or `-name`. Anything else is not a selector.
pub fn parse_selector(token: &str) -> Option<Selector> {
    let caps = selector_pattern().captures(token.trim())?;
    let name = normalize_name(&caps[2]);
    match &caps[1] {
        "*" => Some(Selector::Macro(name)),
        "+" => Some(Selector::Include(name)),
        "-" => Some(Selector::Exclude(name)),
        _ => None,
    }
}

/// Separate stage selectors from ordinary arguments.
///
/// `-name` only counts as an exclude when `is_stage(name)` holds, so short
/// flags such as `-n` keep working. Everything after `--` is passed through.
pub fn split_selector_args<I, S>(
    args: I,
    is_stage: &dyn Fn(&str) -> bool,
) -> (Vec<Selector>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut selectors = Vec::new();
    let mut rest = Vec::new();
    let mut passthrough = false;

    for arg in args {
        let arg: String = arg.into();
        if passthrough {
            rest.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            rest.push(arg);
            continue;
        }
        match parse_selector(&arg) {
            Some(Selector::Exclude(name)) if !is_stage(&name) => rest.push(arg),
            Some(selector) => selectors.push(selector),
            None => rest.push(arg),
        }
    }
    (selectors, rest)
}

/// Raw per-call selection, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub macros: Vec<String>,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
}

impl ExecutionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_selectors<I: IntoIterator<Item = Selector>>(selectors: I) -> Self {
        let mut request = Self::new();
        for selector in selectors {
            request.push(selector);
        }
        request
    }

    pub fn push(&mut self, selector: Selector) {
        match selector {
            Selector::Macro(n) => self.macros.push(n),
            Selector::Include(n) => self.includes.push(n),
            Selector::Exclude(n) => self.excludes.push(n),
        }
    }

    pub fn with_macro(mut self, name: impl AsRef<str>) -> Self {
        self.macros.push(normalize_name(name.as_ref()));
        self
    }

    pub fn with_include(mut self, name: impl AsRef<str>) -> Self {
        self.includes.push(normalize_name(name.as_ref()));
        self
    }

    pub fn with_exclude(mut self, name: impl AsRef<str>) -> Self {
        self.excludes.push(normalize_name(name.as_ref()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty() && self.includes.is_empty() && self.excludes.is_empty()
    }

    /// The same request with every name normalised.
    pub fn normalized(&self) -> Self {
        let names = |list: &[String]| list.iter().map(|n| normalize_name(n)).collect();
        Self {
            macros: names(&self.macros),
            includes: names(&self.includes),
            excludes: names(&self.excludes),
        }
    }
}

/// Normalised selection for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub macros: HashSet<String>,
    pub includes: HashSet<String>,
    pub excludes: HashSet<String>,
}

impl Selection {
    /// Whether a visit to `name` may run it. Include beats exclude.
    pub fn use_stage(&self, name: &str) -> bool {
        self.includes.contains(name) || !self.excludes.contains(name)
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.macros.contains(name)
    }

    pub fn is_include(&self, name: &str) -> bool {
        self.includes.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty() && self.includes.is_empty()
    }

    /// Add more macros when resuming a paused run.
    pub fn extend(&mut self, request: &ExecutionRequest) {
        self.macros.extend(request.macros.iter().cloned());
        self.includes.extend(request.includes.iter().cloned());
        self.excludes.extend(request.excludes.iter().cloned());
    }

    fn with(mut self, request: &ExecutionRequest) -> Self {
        self.extend(request);
        self
    }
}

/// Merge the request with `Options.*` and fall back to `Default` when
/// nothing was selected to run. Excludes alone still use the default.
pub fn resolve(
    request: &ExecutionRequest,
    config: &Configuration,
    registry: &StageRegistry,
) -> Result<Selection, EngineError> {
    let mut merged = request.normalized();
    merged
        .macros
        .extend(config.get_str_list("Options.macro").iter().map(|n| normalize_name(n)));
    merged
        .includes
        .extend(config.get_str_list("Options.include").iter().map(|n| normalize_name(n)));
    merged
        .excludes
        .extend(config.get_str_list("Options.exclude").iter().map(|n| normalize_name(n)));

    if merged.macros.is_empty() && merged.includes.is_empty() {
        merged
            .macros
            .extend(config.get_str_list("Default").iter().map(|n| normalize_name(n)));
    }
    if merged.macros.is_empty() && merged.includes.is_empty() {
        return Err(EngineError::NoStagesSelected);
    }

    let selection = Selection {
        macros: merged.macros.into_iter().collect(),
        includes: merged.includes.into_iter().collect(),
        excludes: merged.excludes.into_iter().collect(),
    };
    validate(&selection, registry)?;
    Ok(selection)
}

/// Normalise a request made while a run is paused and reject unknown names.
/// No defaults apply: an empty request just resumes.
pub(crate) fn check_request(
    request: &ExecutionRequest,
    registry: &StageRegistry,
) -> Result<ExecutionRequest, EngineError> {
    let request = request.normalized();
    let selection = Selection::default().with(&request);
    validate(&selection, registry)?;
    Ok(request)
}

fn validate(selection: &Selection, registry: &StageRegistry) -> Result<(), EngineError> {
    let mut names: Vec<&String> = selection
        .macros
        .iter()
        .chain(&selection.includes)
        .chain(&selection.excludes)
        .collect();
    names.sort();
    match names.into_iter().find(|n| !registry.contains(n)) {
        Some(unknown) => Err(EngineError::UnknownStage(unknown.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StageSpec;

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        for name in ["load", "reduce", "plot"] {
            registry.register(StageSpec::new(name, |_| Ok(()))).unwrap();
        }
        registry
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(parse_selector("*all"), Some(Selector::Macro("all".into())));
        assert_eq!(parse_selector("+load_data"), Some(Selector::Include("load-data".into())));
        assert_eq!(parse_selector("-plot"), Some(Selector::Exclude("plot".into())));
        assert_eq!(parse_selector("--dry-run"), None);
        assert_eq!(parse_selector("plot"), None);
        assert_eq!(parse_selector("*"), None);
    }

    #[test]
    fn test_split_selector_args() {
        let reg = registry();
        let known = |name: &str| reg.contains(name);
        let (selectors, rest) = split_selector_args(
            ["stagewalk", "*all", "-n", "-plot", "+reduce", "--profile", "--", "-load"],
            &known,
        );
        assert_eq!(
            selectors,
            vec![
                Selector::Macro("all".into()),
                Selector::Exclude("plot".into()),
                Selector::Include("reduce".into()),
            ]
        );
        assert_eq!(rest, vec!["stagewalk", "-n", "--profile", "--", "-load"]);
    }

    #[test]
    fn test_resolve_uses_default() {
        let cfg = Configuration::defaults().unwrap();
        let selection = resolve(&ExecutionRequest::new(), &cfg, &registry()).unwrap();
        assert!(selection.is_macro("all"));
        assert!(selection.includes.is_empty());
    }

    #[test]
    fn test_resolve_no_default_is_error() {
        let mut cfg = Configuration::defaults().unwrap();
        cfg.set("Default", toml::Value::Array(Vec::new())).unwrap();
        let err = resolve(&ExecutionRequest::new(), &cfg, &registry()).unwrap_err();
        assert!(matches!(err, EngineError::NoStagesSelected));
    }

    #[test]
    fn test_exclude_only_uses_default() {
        let cfg = Configuration::defaults().unwrap();
        let request = ExecutionRequest::new().with_exclude("plot");
        let selection = resolve(&request, &cfg, &registry()).unwrap();
        assert!(selection.is_macro("all"));
        assert!(!selection.use_stage("plot"));
    }

    #[test]
    fn test_resolve_merges_options() {
        let mut cfg = Configuration::defaults().unwrap();
        cfg.push_str("Options.include", "plot").unwrap();
        let request = ExecutionRequest::new().with_macro("reduce");
        let selection = resolve(&request, &cfg, &registry()).unwrap();
        assert!(selection.is_macro("reduce"));
        assert!(selection.is_include("plot"));
        assert!(!selection.is_macro("all"));
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let cfg = Configuration::defaults().unwrap();
        let request = ExecutionRequest::new().with_macro("nope");
        assert!(matches!(
            resolve(&request, &cfg, &registry()),
            Err(EngineError::UnknownStage(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_resolve_normalizes_request_fields() {
        let mut registry = registry();
        registry
            .register(StageSpec::new("reduce_frames", |_| Ok(())))
            .unwrap();
        let cfg = Configuration::defaults().unwrap();
        let request = ExecutionRequest {
            macros: vec!["reduce_frames".to_string()],
            includes: vec![" plot ".to_string()],
            excludes: Vec::new(),
        };
        let selection = resolve(&request, &cfg, &registry).unwrap();
        assert!(selection.is_macro("reduce-frames"));
        assert!(selection.is_include("plot"));
    }

    #[test]
    fn test_check_request() {
        let reg = registry();
        let request = ExecutionRequest {
            macros: vec!["load".to_string()],
            includes: Vec::new(),
            excludes: vec!["plot".to_string()],
        };
        assert_eq!(check_request(&request, &reg).unwrap(), request);
        assert!(check_request(&ExecutionRequest::new(), &reg).unwrap().is_empty());
        assert!(matches!(
            check_request(&ExecutionRequest::new().with_macro("ghost"), &reg),
            Err(EngineError::UnknownStage(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_include_beats_exclude() {
        let cfg = Configuration::defaults().unwrap();
        let request = ExecutionRequest::new()
            .with_exclude("plot")
            .with_include("plot")
            .with_exclude("load");
        let selection = resolve(&request, &cfg, &registry()).unwrap();
        assert!(selection.use_stage("plot"));
        assert!(!selection.use_stage("load"));
        assert!(selection.use_stage("reduce"));
    }
}
