pub mod codes;
pub mod collection;
pub mod config;
pub mod error;
pub mod types;
pub mod value;

pub use collection::Collection;
pub use config::{ModuleLimits, QuillConfig, SandboxLimits, StateLimits};
pub use error::{ErrorClass, ErrorDetail, QuillError};
pub use types::*;
pub use value::*;
