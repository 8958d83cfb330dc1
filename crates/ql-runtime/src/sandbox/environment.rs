use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use ql_core::{QuillError, Value};
use ql_state::NarrativeState;
use rhai::{Dynamic, Engine, Scope};

use super::bridge::{compile_error, dynamic_to_value, eval_error, root_cause, value_to_dynamic};
use super::budget::Budget;
use super::helpers::HostErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvalMode {
    Expression,
    Statements,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindingTarget {
    Persistent(String),
    Transient(String),
    Local,
}

/// A scope slot pushed before evaluation. `cell` is a shared value, so
/// script assignments land in it immediately and native helpers can see
/// them mid-script.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) name: String,
    pub(crate) target: BindingTarget,
    pub(crate) cell: Dynamic,
    /// Value last exchanged with the state.
    pub(crate) synced: RefCell<Value>,
}

impl Binding {
    pub(crate) fn new(name: String, target: BindingTarget, value: &Value) -> Self {
        Self {
            name,
            target,
            cell: value_to_dynamic(value).into_shared(),
            synced: RefCell::new(value.clone()),
        }
    }
}

/// The bindings of one evaluation, shared between the environment and the
/// native helpers. The state is the meeting point: every helper that reads
/// or writes it flushes script assignments first and refreshes the scope
/// afterwards.
#[derive(Debug, Clone, Default)]
pub(crate) struct LiveBindings(Rc<Vec<Binding>>);

impl LiveBindings {
    pub(crate) fn new(bindings: Vec<Binding>) -> Self {
        Self(Rc::new(bindings))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.0.iter()
    }

    /// Copies slots the script changed since the last exchange into `state`.
    pub(crate) fn flush(&self, state: &mut NarrativeState) -> Result<(), QuillError> {
        for binding in self.0.iter() {
            if binding.target == BindingTarget::Local || binding.cell.is_locked() {
                continue;
            }
            let current = dynamic_to_value(binding.cell.flatten_clone())?;
            if current == *binding.synced.borrow() {
                continue;
            }
            match &binding.target {
                BindingTarget::Persistent(name) => state.set_variable(name, current.clone())?,
                BindingTarget::Transient(name) => state.set_temp(name, current.clone())?,
                BindingTarget::Local => {}
            }
            *binding.synced.borrow_mut() = current;
        }
        Ok(())
    }

    /// Pulls values the state changed under the script back into its slots.
    /// A variable removed from the state reads as nil.
    pub(crate) fn refresh(&self, state: &NarrativeState) {
        for binding in self.0.iter() {
            let stored = match &binding.target {
                BindingTarget::Persistent(name) => state.get_variable(name),
                BindingTarget::Transient(name) => state.get_temp(name),
                BindingTarget::Local => continue,
            }
            .cloned()
            .unwrap_or(Value::Nil);
            if stored == *binding.synced.borrow() {
                continue;
            }
            let mut cell = binding.cell.clone();
            match cell.write_lock::<Dynamic>() {
                Some(mut slot) => *slot = value_to_dynamic(&stored),
                None => {
                    tracing::debug!(name = %binding.name, "binding busy; refresh skipped");
                    continue;
                }
            }
            *binding.synced.borrow_mut() = stored;
        }
    }
}

/// One evaluation's engine, scope and the state it works on. The state is
/// owned here until [`ScriptEnvironment::into_state`] hands it back.
pub struct ScriptEnvironment {
    pub(crate) engine: Engine,
    pub(crate) scope: Scope<'static>,
    pub(crate) bindings: LiveBindings,
    pub(crate) state: Rc<RefCell<NarrativeState>>,
    pub(crate) errors: HostErrors,
    pub(crate) budget: Option<Rc<Budget>>,
    pub(crate) source: Option<String>,
    pub(crate) transactional: bool,
    pub(crate) rewrite: Box<dyn Fn(&str) -> String>,
}

impl ScriptEnvironment {
    /// Names visible to the script, in push order. Later entries shadow
    /// earlier ones with the same name.
    pub fn bound_names(&self) -> Vec<&str> {
        self.bindings
            .iter()
            .map(|binding| binding.name.as_str())
            .collect()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn evaluate(&mut self, text: &str, mode: EvalMode) -> Result<Value, QuillError> {
        let source = (self.rewrite)(text);
        let ast = match mode {
            EvalMode::Expression => self.engine.compile_expression_with_scope(&self.scope, &source),
            EvalMode::Statements => self.engine.compile_with_scope(&self.scope, &source),
        }
        .map_err(|error| compile_error(&error, self.source.as_deref()))?;

        let outcome = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &ast);
        match self.settle(outcome) {
            Ok(value) => {
                self.write_back()?;
                dynamic_to_value(value)
            }
            Err(error) => {
                // Best-effort mode keeps whatever the script assigned before failing.
                if !self.transactional {
                    if let Err(write_error) = self.write_back() {
                        tracing::warn!(error = %write_error, "partial write-back failed");
                    }
                }
                Err(error)
            }
        }
    }

    /// Turns rhai's outcome into ours. Errors parked by native helpers win
    /// over rhai's stringly copy of them.
    fn settle(
        &self,
        outcome: Result<Dynamic, Box<rhai::EvalAltResult>>,
    ) -> Result<Dynamic, QuillError> {
        let parked = self.errors.take();
        let source = self.source.as_deref();
        match (outcome, parked) {
            (_, Some(parked)) if parked.is_abort() => Err(parked),
            (Ok(value), _) => Ok(value),
            (Err(error), Some(parked)) if raised_by_host(&error, &parked) => {
                let span = parked
                    .span
                    .clone()
                    .or_else(|| eval_error(&error, source).span);
                Err(parked.at(span))
            }
            (Err(error), _) => Err(eval_error(&error, source)),
        }
    }

    /// Final exchange once the script is done. Locals belong to the
    /// caller's scope chain and are dropped.
    fn write_back(&mut self) -> Result<(), QuillError> {
        self.bindings.flush(&mut self.state.borrow_mut())
    }

    pub fn into_state(self) -> NarrativeState {
        let Self { engine, state, .. } = self;
        drop(engine);
        match Rc::try_unwrap(state) {
            Ok(cell) => cell.into_inner(),
            Err(shared) => mem::take(&mut *shared.borrow_mut()),
        }
    }
}

fn raised_by_host(error: &rhai::EvalAltResult, parked: &QuillError) -> bool {
    match root_cause(error) {
        rhai::EvalAltResult::ErrorRuntime(value, _) => value
            .clone()
            .try_cast::<rhai::ImmutableString>()
            .map_or(false, |text| text.as_str() == parked.to_string()),
        _ => false,
    }
}
