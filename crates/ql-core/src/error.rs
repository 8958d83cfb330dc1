use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codes;
use crate::types::SourceSpan;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct QuillError {
    pub code: String,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub suggestion: Option<String>,
    pub detail: Option<ErrorDetail>,
}

/// Structured payload attached to an error for callers that render their own
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ErrorDetail {
    IncludeChain { chain: Vec<String> },
    CallTrace { frames: Vec<String>, omitted: usize },
    Violations { violations: Vec<String> },
    MigrationStep { from: String, to: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Compile,
    Runtime,
    ResourceLimit,
    Recursion,
    Tunnel,
    Include,
    Save,
    State,
    Module,
    Story,
    Config,
    Cli,
}

impl QuillError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: None,
            suggestion: None,
            detail: None,
        }
    }

    pub fn with_span(
        code: impl Into<String>,
        message: impl Into<String>,
        span: SourceSpan,
    ) -> Self {
        Self::new(code, message).at(Some(span))
    }

    pub fn at(mut self, span: Option<SourceSpan>) -> Self {
        self.span = span;
        self
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn class(&self) -> ErrorClass {
        match self.code.as_str() {
            codes::SCRIPT_COMPILE => ErrorClass::Compile,
            codes::SCRIPT_RESOURCE_LIMIT => ErrorClass::ResourceLimit,
            codes::RECURSION_LIMIT => ErrorClass::Recursion,
            codes::TUNNEL_OVERFLOW | codes::TUNNEL_UNDERFLOW => ErrorClass::Tunnel,
            code if code.starts_with("SCRIPT_") || code.starts_with("SANDBOX_") => {
                ErrorClass::Runtime
            }
            code if code.starts_with("INCLUDE_") => ErrorClass::Include,
            code if code.starts_with("SAVE_") => ErrorClass::Save,
            code if code.starts_with("STATE_") => ErrorClass::State,
            code if code.starts_with("MODULE_") => ErrorClass::Module,
            code if code.starts_with("STORY_") => ErrorClass::Story,
            code if code.starts_with("CONFIG_") => ErrorClass::Config,
            code if code.starts_with("CLI_") => ErrorClass::Cli,
            _ => ErrorClass::Runtime,
        }
    }

    /// Errors that must abort the in-flight content instead of being retried
    /// or reported inline.
    pub fn is_abort(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::ResourceLimit | ErrorClass::Recursion | ErrorClass::Tunnel
        )
    }

    pub fn include_chain(&self) -> Option<&[String]> {
        match &self.detail {
            Some(ErrorDetail::IncludeChain { chain }) => Some(chain),
            _ => None,
        }
    }

    pub fn violations(&self) -> Option<&[String]> {
        match &self.detail {
            Some(ErrorDetail::Violations { violations }) => Some(violations),
            _ => None,
        }
    }
}
