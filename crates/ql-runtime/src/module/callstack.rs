use std::time::Instant;

use ql_core::Value;

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub name: String,
    pub args: Vec<Value>,
    pub depth: usize,
    pub started: Instant,
}

impl CallFrame {
    /// `name(arg, ...)` with every argument cut to `arg_len` characters.
    pub fn describe(&self, arg_len: usize) -> String {
        let args = self
            .args
            .iter()
            .map(|arg| truncate(&display_arg(arg), arg_len))
            .collect::<Vec<_>>();
        format!("{}({})", self.name, args.join(", "))
    }
}

fn display_arg(value: &Value) -> String {
    match value {
        Value::String(text) => format!("{:?}", text),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Map(entries) => format!("{{{} entries}}", entries.len()),
        other => other.to_text(),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

/// Recursion stack for module function calls. Independent of the tunnel
/// stack kept in the narrative state.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn push(&mut self, name: &str, args: Vec<Value>) {
        let depth = self.frames.len() + 1;
        self.frames.push(CallFrame {
            name: name.to_string(),
            args,
            depth,
            started: Instant::now(),
        });
    }

    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    /// The most recent `limit` frames, innermost first, and how many older
    /// frames were left out.
    pub fn trace(&self, limit: usize, arg_len: usize) -> (Vec<String>, usize) {
        let shown = self
            .frames
            .iter()
            .rev()
            .take(limit)
            .map(|frame| format!("#{} {}", frame.depth, frame.describe(arg_len)))
            .collect::<Vec<_>>();
        let omitted = self.frames.len().saturating_sub(shown.len());
        (shown, omitted)
    }
}
