use ql_core::{codes, QuillError};
use ql_loader::is_identifier;

/// Stack of entered namespaces. Each entry may itself be dotted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceStack {
    entries: Vec<String>,
}

pub(crate) fn check_qualified_name(name: &str) -> Result<(), QuillError> {
    if !name.is_empty() && name.split('.').all(is_identifier) {
        return Ok(());
    }
    Err(QuillError::new(
        codes::MODULE_INVALID_NAME,
        format!("\"{}\" is not a valid dotted name.", name),
    )
    .suggest("Use identifiers separated by dots, such as combat.damage."))
}

impl NamespaceStack {
    /// Stack positioned at `namespace`; empty means global.
    pub fn at(namespace: &str) -> Self {
        let entries = if namespace.is_empty() {
            Vec::new()
        } else {
            vec![namespace.to_string()]
        };
        Self { entries }
    }

    pub fn enter(&mut self, name: &str) -> Result<(), QuillError> {
        check_qualified_name(name)?;
        self.entries.push(name.to_string());
        Ok(())
    }

    pub fn exit(&mut self) -> Result<String, QuillError> {
        self.entries.pop().ok_or_else(|| {
            QuillError::new(
                codes::MODULE_NAMESPACE_UNDERFLOW,
                "exit_namespace called with no namespace entered.",
            )
        })
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn current(&self) -> String {
        self.entries.join(".")
    }

    pub fn qualify(&self, name: &str) -> String {
        if self.entries.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.current(), name)
        }
    }

    /// Lookup candidates for `name`: the current namespace first, then each
    /// enclosing namespace, then global.
    pub fn candidates(&self, name: &str) -> Vec<String> {
        let current = self.current();
        let segments: Vec<&str> = if current.is_empty() {
            Vec::new()
        } else {
            current.split('.').collect()
        };
        (0..=segments.len())
            .rev()
            .map(|len| {
                if len == 0 {
                    name.to_string()
                } else {
                    format!("{}.{}", segments[..len].join("."), name)
                }
            })
            .collect()
    }
}
