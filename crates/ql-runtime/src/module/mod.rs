//! Namespaced module functions, recursion tracking and include loading.

mod callstack;
mod namespace;
mod scope;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ql_core::{codes, ErrorDetail, ModuleLimits, QuillError, SourceSpan, Value};
use ql_loader::{
    is_identifier, DefinitionParser, FsSource, MemorySource, ModuleParser, PathResolver,
    SourceProvider,
};
use ql_state::NarrativeState;

use crate::sandbox::{FunctionHost, Interpreter, ScriptContext};

pub use self::callstack::{CallFrame, CallStack};
pub use self::namespace::NamespaceStack;
pub use self::scope::ScopeChain;

use self::namespace::check_qualified_name;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    /// Fully qualified, e.g. `combat.damage`.
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
    /// Namespace the body resolves unqualified calls against.
    pub namespace: String,
    pub source: Option<PathBuf>,
    pub span: Option<SourceSpan>,
}

/// A loaded module file. Keyed by its resolved path for caching and cycle
/// detection.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeRecord {
    pub path: PathBuf,
    pub functions: Vec<String>,
    pub includes: Vec<PathBuf>,
}

#[derive(Debug)]
struct Registry {
    functions: BTreeMap<String, FunctionDefinition>,
    namespaces: NamespaceStack,
    scopes: ScopeChain,
    calls: CallStack,
    resolver: PathResolver,
    includes: BTreeMap<PathBuf, IncludeRecord>,
}

/// Shared handle over one session's module registry. Clones see the same
/// functions, namespaces and stacks.
#[derive(Clone)]
pub struct ModuleRuntime {
    inner: Rc<RefCell<Registry>>,
    parser: Rc<dyn ModuleParser>,
    source: Rc<dyn SourceProvider>,
    limits: ModuleLimits,
}

impl fmt::Debug for ModuleRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRuntime")
            .field("registry", &self.inner.borrow())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Undoes a call's frame, scope and namespace switch on every exit path.
struct CallGuard {
    inner: Rc<RefCell<Registry>>,
    caller_namespaces: Option<NamespaceStack>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let mut registry = self.inner.borrow_mut();
        registry.calls.pop();
        registry.scopes.pop();
        if let Some(namespaces) = self.caller_namespaces.take() {
            registry.namespaces = namespaces;
        }
    }
}

impl ModuleRuntime {
    pub fn new(
        limits: ModuleLimits,
        parser: Rc<dyn ModuleParser>,
        source: Rc<dyn SourceProvider>,
    ) -> Self {
        let registry = Registry {
            functions: BTreeMap::new(),
            namespaces: NamespaceStack::default(),
            scopes: ScopeChain::default(),
            calls: CallStack::default(),
            resolver: PathResolver::from_limits(&limits),
            includes: BTreeMap::new(),
        };
        Self {
            inner: Rc::new(RefCell::new(registry)),
            parser,
            source,
            limits,
        }
    }

    /// Module files read from disk with the built-in definition format.
    pub fn with_filesystem(limits: ModuleLimits) -> Self {
        Self::new(limits, Rc::new(DefinitionParser), Rc::new(FsSource))
    }

    pub fn in_memory(limits: ModuleLimits, files: MemorySource) -> Self {
        Self::new(limits, Rc::new(DefinitionParser), Rc::new(files))
    }

    pub fn limits(&self) -> &ModuleLimits {
        &self.limits
    }

    // Namespaces

    pub fn enter_namespace(&self, name: &str) -> Result<(), QuillError> {
        self.inner.borrow_mut().namespaces.enter(name)
    }

    pub fn exit_namespace(&self) -> Result<String, QuillError> {
        self.inner.borrow_mut().namespaces.exit()
    }

    pub fn current_namespace(&self) -> String {
        self.inner.borrow().namespaces.current()
    }

    // Functions

    /// Registers `name` under the current namespace and returns the
    /// qualified name.
    pub fn define_function(
        &self,
        name: &str,
        params: Vec<String>,
        body: impl Into<String>,
    ) -> Result<String, QuillError> {
        check_qualified_name(name)?;
        if let Some(param) = params.iter().find(|param| !is_identifier(param)) {
            return Err(QuillError::new(
                codes::MODULE_INVALID_NAME,
                format!("Parameter \"{}\" of \"{}\" is not an identifier.", param, name),
            ));
        }
        let namespace = self.current_namespace();
        let qualified = self.inner.borrow().namespaces.qualify(name);
        let definition_namespace = match qualified.rsplit_once('.') {
            Some((parent, _)) => parent.to_string(),
            None => namespace,
        };
        self.register(FunctionDefinition {
            name: qualified.clone(),
            params,
            body: body.into(),
            namespace: definition_namespace,
            source: None,
            span: None,
        });
        Ok(qualified)
    }

    fn register(&self, definition: FunctionDefinition) {
        let mut registry = self.inner.borrow_mut();
        if registry.functions.contains_key(&definition.name) {
            tracing::debug!(function = %definition.name, "module function redefined");
        }
        registry
            .functions
            .insert(definition.name.clone(), definition);
    }

    pub fn has_function(&self, qualified: &str) -> bool {
        self.inner.borrow().functions.contains_key(qualified)
    }

    pub fn function(&self, qualified: &str) -> Option<FunctionDefinition> {
        self.inner.borrow().functions.get(qualified).cloned()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.inner.borrow().functions.keys().cloned().collect()
    }

    /// A dotted name as written, then the current namespace and each
    /// enclosing one, then global. Unknown names come back unchanged.
    pub fn resolve_in_context(&self, name: &str) -> String {
        let registry = self.inner.borrow();
        if name.contains('.') && registry.functions.contains_key(name) {
            return name.to_string();
        }
        registry
            .namespaces
            .candidates(name)
            .into_iter()
            .find(|candidate| registry.functions.contains_key(candidate))
            .unwrap_or_else(|| name.to_string())
    }

    pub fn call_depth(&self) -> usize {
        self.inner.borrow().calls.depth()
    }

    pub fn scope_depth(&self) -> usize {
        self.inner.borrow().scopes.depth()
    }

    pub fn call_function(
        &self,
        name: &str,
        args: Vec<Value>,
        state: &mut NarrativeState,
        interpreter: &Interpreter,
    ) -> Result<Value, QuillError> {
        let qualified = self.resolve_in_context(name);
        let Some(definition) = self.function(&qualified) else {
            return Err(QuillError::new(
                codes::MODULE_FUNCTION_NOT_FOUND,
                format!("Function \"{}\" is not defined.", name),
            )
            .suggest(self.not_found_hint(name)));
        };
        if args.len() != definition.params.len() {
            return Err(QuillError::new(
                codes::MODULE_ARGUMENT_COUNT,
                format!(
                    "\"{}\" takes {} argument(s) but was called with {}.",
                    qualified,
                    definition.params.len(),
                    args.len()
                ),
            )
            .at(definition.span.clone()));
        }

        let guard = {
            let mut registry = self.inner.borrow_mut();
            if registry.calls.depth() >= self.limits.max_recursion_depth {
                let (frames, omitted) = registry
                    .calls
                    .trace(self.limits.trace_frames, self.limits.arg_display_len);
                return Err(QuillError::new(
                    codes::RECURSION_LIMIT,
                    format!(
                        "Calling \"{}\" would exceed the recursion limit of {}.",
                        qualified, self.limits.max_recursion_depth
                    ),
                )
                .suggest("Check that the recursive function reaches a base case.")
                .detail(ErrorDetail::CallTrace { frames, omitted }));
            }
            registry.calls.push(&qualified, args.clone());
            registry.scopes.push(
                definition
                    .params
                    .iter()
                    .cloned()
                    .zip(args)
                    .collect::<BTreeMap<_, _>>(),
            );
            let caller = std::mem::replace(
                &mut registry.namespaces,
                NamespaceStack::at(&definition.namespace),
            );
            CallGuard {
                inner: Rc::clone(&self.inner),
                caller_namespaces: Some(caller),
            }
        };

        let ctx = ScriptContext::new()
            .with_source(
                definition
                    .source
                    .as_ref()
                    .map_or_else(|| qualified.clone(), |path| path.display().to_string()),
            )
            .with_locals(self.inner.borrow().scopes.visible())
            .with_host(Rc::new(self.clone()));
        tracing::debug!(function = %qualified, depth = self.call_depth(), "module call");
        let result = interpreter.execute_code(&definition.body, state, &ctx);
        drop(guard);
        result
    }

    fn not_found_hint(&self, name: &str) -> String {
        let short = name.rsplit('.').next().unwrap_or(name);
        let similar = self
            .inner
            .borrow()
            .functions
            .keys()
            .filter(|known| known.rsplit('.').next() == Some(short))
            .cloned()
            .collect::<Vec<_>>();
        if similar.is_empty() {
            "Define the function or include the module that declares it.".to_string()
        } else {
            format!("Did you mean {}?", similar.join(" or "))
        }
    }

    // Includes

    pub fn include_stack(&self) -> Vec<PathBuf> {
        self.inner.borrow().resolver.include_stack().to_vec()
    }

    pub fn loaded_includes(&self) -> Vec<PathBuf> {
        self.inner.borrow().includes.keys().cloned().collect()
    }

    /// Loads a module file and everything it includes. Files already
    /// loaded come from the cache.
    pub fn load_include(
        &self,
        reference: &str,
        from_file: Option<&Path>,
        loc: Option<SourceSpan>,
    ) -> Result<IncludeRecord, QuillError> {
        let resolved = {
            let registry = self.inner.borrow();
            if registry.resolver.include_depth() >= self.limits.max_include_depth {
                return Err(QuillError::new(
                    codes::INCLUDE_DEPTH_EXCEEDED,
                    format!(
                        "Including \"{}\" would exceed the include depth limit of {}.",
                        reference, self.limits.max_include_depth
                    ),
                )
                .at(loc));
            }
            registry
                .resolver
                .resolve(reference, from_file, self.source.as_ref())
                .ok_or_else(|| {
                    let tried = registry
                        .resolver
                        .candidates(reference, from_file)
                        .iter()
                        .map(|candidate| candidate.display().to_string())
                        .collect::<Vec<_>>();
                    QuillError::new(
                        codes::INCLUDE_NOT_FOUND,
                        format!("Include \"{}\" was not found.", reference),
                    )
                    .suggest(format!("Looked in: {}", tried.join(", ")))
                    .at(loc.clone())
                })?
        };

        self.inner
            .borrow_mut()
            .resolver
            .push_include(&resolved)
            .map_err(|error| error.at(loc.clone()))?;

        let cached = self.inner.borrow().includes.get(&resolved).cloned();
        if let Some(record) = cached {
            self.inner.borrow_mut().resolver.pop_include();
            tracing::debug!(path = %resolved.display(), "include served from cache");
            return Ok(record);
        }

        let loaded = self.read_module(&resolved);
        self.inner.borrow_mut().resolver.pop_include();
        let (definitions, includes) = loaded?;

        let record = IncludeRecord {
            path: resolved.clone(),
            functions: definitions.iter().map(|def| def.name.clone()).collect(),
            includes,
        };
        for definition in definitions {
            self.register(definition);
        }
        self.inner
            .borrow_mut()
            .includes
            .insert(resolved.clone(), record.clone());
        tracing::info!(
            path = %resolved.display(),
            functions = record.functions.len(),
            "module included"
        );
        Ok(record)
    }

    fn read_module(
        &self,
        resolved: &Path,
    ) -> Result<(Vec<FunctionDefinition>, Vec<PathBuf>), QuillError> {
        let text = self.source.read(resolved)?;
        let parsed = self.parser.parse(resolved, &text)?;

        let mut includes = Vec::with_capacity(parsed.includes.len());
        for directive in &parsed.includes {
            let nested =
                self.load_include(&directive.reference, Some(resolved), Some(directive.span.clone()))?;
            includes.push(nested.path);
        }

        let definitions = parsed
            .functions
            .into_iter()
            .map(|function| {
                let namespace = function
                    .name
                    .rsplit_once('.')
                    .map(|(parent, _)| parent.to_string())
                    .unwrap_or_default();
                FunctionDefinition {
                    name: function.name,
                    params: function.params,
                    body: function.body,
                    namespace,
                    source: Some(resolved.to_path_buf()),
                    span: Some(function.span),
                }
            })
            .collect();
        Ok((definitions, includes))
    }
}

impl FunctionHost for ModuleRuntime {
    fn resolve_function(&self, name: &str) -> Option<String> {
        let qualified = self.resolve_in_context(name);
        self.has_function(&qualified).then_some(qualified)
    }

    fn call_function(
        &self,
        name: &str,
        args: Vec<Value>,
        state: &mut NarrativeState,
        interpreter: &Interpreter,
    ) -> Result<Value, QuillError> {
        ModuleRuntime::call_function(self, name, args, state, interpreter)
    }
}
