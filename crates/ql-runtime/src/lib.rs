//! Script evaluation for narrative content: the rhai sandbox, the in-text
//! control-flow processor and the module runtime.

pub mod flow;
pub mod module;
pub mod sandbox;

pub use flow::{AlternativeMode, ControlFlowProcessor};
pub use module::{
    CallFrame, CallStack, FunctionDefinition, IncludeRecord, ModuleRuntime, NamespaceStack,
    ScopeChain,
};
pub use sandbox::capabilities::{is_bindable_name, DENIED_FUNCTIONS, DISABLED_SYMBOLS};
pub use sandbox::{FunctionHost, Interpreter, ScriptContext, ScriptEnvironment};
