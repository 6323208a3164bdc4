#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use stagewalk_core::api::{Engine, ExecutionRequest, MemoryLogger, StageError, StageSpec};

/// Engine wired to an in-memory logger, with stage bodies that record
/// their invocation order.
pub struct Harness {
    pub engine: Engine,
    pub logger: Arc<MemoryLogger>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl Harness {
    pub fn new() -> Self {
        let logger = Arc::new(MemoryLogger::new());
        Self {
            engine: Engine::new("harness", logger.clone()),
            logger,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A stage whose body only records that it ran.
    pub fn stage(&self, name: &str) -> StageSpec {
        let calls = self.calls.clone();
        let label = name.to_string();
        StageSpec::new(name, move |_| {
            calls.borrow_mut().push(label.clone());
            Ok(())
        })
    }

    /// A stage whose body records itself and then fails with `kind`.
    pub fn failing(&self, name: &str, kind: &str) -> StageSpec {
        let calls = self.calls.clone();
        let label = name.to_string();
        let kind = kind.to_string();
        StageSpec::new(name, move |_| {
            calls.borrow_mut().push(label.clone());
            Err(StageError::new(kind.clone(), format!("{label} went wrong")))
        })
    }

    /// A stage that asks the engine to pause after it completes.
    pub fn pausing(&self, name: &str) -> StageSpec {
        let calls = self.calls.clone();
        let label = name.to_string();
        StageSpec::new(name, move |ctx| {
            calls.borrow_mut().push(label.clone());
            ctx.request_pause();
            Ok(())
        })
    }

    pub fn register(&mut self, spec: StageSpec) {
        self.engine.register(spec).expect("stage registers");
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

pub fn macros(names: &[&str]) -> ExecutionRequest {
    names
        .iter()
        .fold(ExecutionRequest::new(), |req, name| req.with_macro(name))
}

pub fn sorted(names: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let mut out: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
    out.sort();
    out
}
