mod definitions;
mod resolver;
mod source;

pub use definitions::{
    is_identifier, DefinitionParser, FunctionSource, IncludeDirective, ModuleParser,
    ParsedModule,
};
pub use resolver::PathResolver;
pub use source::{FsSource, MemorySource, SourceProvider};
