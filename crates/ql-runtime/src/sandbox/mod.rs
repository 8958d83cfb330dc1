//! Capability-restricted evaluation of author scripts.
//!
//! Every evaluation builds a fresh rhai engine from the fixed allow-list in
//! [`capabilities`] and binds story variables into its scope as shared
//! slots. Native helpers exchange those slots with [`NarrativeState`]
//! around every state access, so a script, its helpers and the module
//! functions it calls all see one live state.

mod bridge;
mod budget;
pub mod capabilities;
mod environment;
mod helpers;

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use ql_core::{QuillError, SandboxLimits, Value};
use ql_state::NarrativeState;
use rhai::{Dynamic, Engine, Scope};

use self::bridge::rewrite_module_calls;
use self::budget::Budget;
use self::capabilities::{disable_symbols, install_allowed_packages, is_bindable_name};
use self::environment::{Binding, BindingTarget, EvalMode, LiveBindings};
use self::helpers::{register_helpers, HelperContext, HostErrors};

pub use self::environment::ScriptEnvironment;

/// Re-entry point for module functions called from scripts.
pub trait FunctionHost {
    /// Qualified name for `name` when it denotes a callable function.
    fn resolve_function(&self, name: &str) -> Option<String>;

    fn call_function(
        &self,
        name: &str,
        args: Vec<Value>,
        state: &mut NarrativeState,
        interpreter: &Interpreter,
    ) -> Result<Value, QuillError>;
}

/// Per-evaluation inputs besides the state itself.
#[derive(Clone, Default)]
pub struct ScriptContext {
    /// Label used in error spans; a passage id or a module file.
    pub source: Option<String>,
    /// Function-call locals, outermost first. They shadow story variables.
    pub locals: Vec<(String, Value)>,
    pub host: Option<Rc<dyn FunctionHost>>,
}

impl fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("source", &self.source)
            .field("locals", &self.locals)
            .field("host", &self.host.is_some())
            .finish()
    }
}

impl ScriptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_locals(mut self, locals: Vec<(String, Value)>) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_host(mut self, host: Rc<dyn FunctionHost>) -> Self {
        self.host = Some(host);
        self
    }
}

/// Sandboxed evaluator. Cheap to clone; clones share the active budget so
/// nested module calls are charged to the outermost evaluation.
#[derive(Clone)]
pub struct Interpreter {
    limits: SandboxLimits,
    active_budget: Rc<RefCell<Option<Rc<Budget>>>>,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("limits", &self.limits)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

impl Interpreter {
    pub fn new(limits: SandboxLimits) -> Self {
        Self {
            limits,
            active_budget: Rc::new(RefCell::new(None)),
        }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn evaluate_expression(
        &self,
        text: &str,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
    ) -> Result<Value, QuillError> {
        self.run(text, EvalMode::Expression, state, ctx)
    }

    /// Blank conditions hold. Anything else is judged by truthiness.
    pub fn evaluate_condition(
        &self,
        text: &str,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
    ) -> Result<bool, QuillError> {
        if text.trim().is_empty() {
            return Ok(true);
        }
        self.run(text, EvalMode::Expression, state, ctx)
            .map(|value| value.is_truthy())
    }

    /// Runs a statement block; yields the last statement's value or the
    /// argument of `return`.
    pub fn execute_code(
        &self,
        text: &str,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
    ) -> Result<Value, QuillError> {
        self.run(text, EvalMode::Statements, state, ctx)
    }

    pub fn set_seed(&self, state: &mut NarrativeState, seed: u32) {
        state.reseed(seed);
        tracing::debug!(seed, "script randomness reseeded");
    }

    /// Builds the engine and scope for one evaluation over `state`.
    pub fn build_environment(
        &self,
        state: NarrativeState,
        ctx: &ScriptContext,
    ) -> ScriptEnvironment {
        let mut scope = Scope::new();
        let mut bindings = Vec::new();
        let mut bind = |name: String, target: BindingTarget, value: &Value| {
            let binding = Binding::new(name, target, value);
            scope.push_dynamic(binding.name.clone(), binding.cell.clone());
            bindings.push(binding);
        };

        for (name, value) in state.variables() {
            if is_bindable_name(name) {
                bind(name.clone(), BindingTarget::Persistent(name.clone()), value);
            }
        }
        for (name, value) in state.temps() {
            let scoped = format!("_{}", name);
            if is_bindable_name(&scoped) {
                bind(scoped, BindingTarget::Transient(name.clone()), value);
            }
        }
        for (name, value) in &ctx.locals {
            if is_bindable_name(name) {
                bind(name.clone(), BindingTarget::Local, value);
            }
        }

        let budget = if self.limits.enabled {
            Some(
                self.active_budget
                    .borrow()
                    .clone()
                    .unwrap_or_else(|| Rc::new(Budget::start(&self.limits))),
            )
        } else {
            None
        };
        let bindings = LiveBindings::new(bindings);
        let errors = HostErrors::default();
        let shared = Rc::new(RefCell::new(state));

        let mut engine = Engine::new_raw();
        install_allowed_packages(&mut engine);
        disable_symbols(&mut engine);
        engine.set_strict_variables(true);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_string_size(self.limits.max_string_size);
        engine.set_max_array_size(self.limits.max_array_size);
        engine.set_max_map_size(self.limits.max_map_size);
        if let Some(budget) = &budget {
            engine.set_max_operations(self.limits.max_instructions);
            let budget = Rc::clone(budget);
            let errors = errors.clone();
            let last = std::cell::Cell::new(0u64);
            engine.on_progress(move |operations| {
                let delta = operations.saturating_sub(last.get());
                last.set(operations);
                match budget.charge(delta) {
                    Ok(()) => None,
                    Err(breach) => {
                        let _ = errors.raise(breach.into_error());
                        Some(Dynamic::UNIT)
                    }
                }
            });
        }

        register_helpers(
            &mut engine,
            &HelperContext {
                state: Rc::clone(&shared),
                bindings: bindings.clone(),
                errors: errors.clone(),
                budget: budget.clone(),
                max_string_size: self.limits.max_string_size,
                host: ctx.host.clone(),
                interpreter: self.clone(),
            },
        );

        let host = ctx.host.clone();
        let rewrite: Box<dyn Fn(&str) -> String> = match host {
            Some(host) => Box::new(move |text: &str| {
                rewrite_module_calls(text, |name| host.resolve_function(name))
            }),
            None => Box::new(|text: &str| text.to_string()),
        };

        ScriptEnvironment {
            engine,
            scope,
            bindings,
            state: shared,
            errors,
            budget,
            source: ctx.source.clone(),
            transactional: self.limits.transactional,
            rewrite,
        }
    }

    fn run(
        &self,
        text: &str,
        mode: EvalMode,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
    ) -> Result<Value, QuillError> {
        let outermost = self.limits.enabled && self.active_budget.borrow().is_none();
        if outermost {
            *self.active_budget.borrow_mut() = Some(Rc::new(Budget::start(&self.limits)));
        }
        let checkpoint = self.limits.transactional.then(|| state.checkpoint());

        let mut environment = self.build_environment(mem::take(state), ctx);
        let result = environment.evaluate(text, mode);
        let spent = environment.budget.as_ref().map(|budget| budget.spent());
        *state = environment.into_state();

        if outermost {
            *self.active_budget.borrow_mut() = None;
        }
        match &result {
            Ok(_) => tracing::debug!(mode = ?mode, spent, "script evaluated"),
            Err(error) => {
                tracing::debug!(mode = ?mode, code = %error.code, spent, "script failed");
                if let Some(checkpoint) = checkpoint {
                    state.rollback(checkpoint);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod sandbox_tests;
