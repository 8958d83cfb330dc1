//! In-text control flow: conditional blocks, inline conditionals and
//! stateful text alternatives.

mod parse;
mod token;

use std::sync::OnceLock;

use ql_core::QuillError;
use ql_state::NarrativeState;
use regex::Regex;

use crate::sandbox::{Interpreter, ScriptContext};

pub use self::parse::{parse, Node, Section};
pub use self::token::{tokenize, AlternativeMode, Tag, TagKind, Token};

fn interpolation_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\$\{([^{}]+)\}").expect("interpolation regex must compile"))
}

#[derive(Debug, Clone, Default)]
pub struct ControlFlowProcessor {
    interpreter: Interpreter,
}

impl ControlFlowProcessor {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Resolves every conditional and alternative in `content`. `${...}`
    /// markers are left in place for [`ControlFlowProcessor::interpolate`].
    pub fn process(
        &self,
        content: &str,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
    ) -> Result<String, QuillError> {
        let nodes = parse(tokenize(content));
        let site_prefix = ctx
            .source
            .clone()
            .or_else(|| state.current_passage().map(str::to_string))
            .unwrap_or_default();
        let mut out = String::with_capacity(content.len());
        self.render_nodes(&nodes, &site_prefix, state, ctx, &mut out)?;
        tracing::debug!(site = %site_prefix, nodes = nodes.len(), "content processed");
        Ok(out)
    }

    /// Replaces `${expr}` markers with the text of their values.
    pub fn interpolate(
        &self,
        content: &str,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
    ) -> Result<String, QuillError> {
        let mut output = String::new();
        let mut last_index = 0usize;
        for captures in interpolation_regex().captures_iter(content) {
            let (Some(full), Some(expr)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            output.push_str(&content[last_index..full.start()]);
            let value = self
                .interpreter
                .evaluate_expression(expr.as_str(), state, ctx)?;
            output.push_str(&value.to_text());
            last_index = full.end();
        }
        output.push_str(&content[last_index..]);
        Ok(output)
    }

    /// [`process`](Self::process) followed by [`interpolate`](Self::interpolate).
    pub fn render(
        &self,
        content: &str,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
    ) -> Result<String, QuillError> {
        let processed = self.process(content, state, ctx)?;
        self.interpolate(&processed, state, ctx)
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        site_prefix: &str,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
        out: &mut String,
    ) -> Result<(), QuillError> {
        for node in nodes {
            match node {
                Node::Text(text) | Node::Interpolation(text) => out.push_str(text),
                Node::Block { sections, .. } => {
                    for section in sections {
                        let taken = match &section.condition {
                            Some(condition) => self.condition_holds(condition, state, ctx)?,
                            None => true,
                        };
                        if taken {
                            self.render_nodes(&section.body, site_prefix, state, ctx, out)?;
                            break;
                        }
                    }
                }
                Node::Inline {
                    condition,
                    when_true,
                    when_false,
                } => {
                    if self.condition_holds(condition, state, ctx)? {
                        out.push_str(when_true);
                    } else {
                        out.push_str(when_false);
                    }
                }
                Node::Alternatives {
                    mode,
                    options,
                    offset,
                } => {
                    let site = format!("{}:{}", site_prefix, offset);
                    if let Some(option) = pick_alternative(*mode, options, &site, state) {
                        out.push_str(option);
                    }
                }
            }
        }
        Ok(())
    }

    /// Ordinary script failures count as false. Aborts still propagate.
    fn condition_holds(
        &self,
        condition: &str,
        state: &mut NarrativeState,
        ctx: &ScriptContext,
    ) -> Result<bool, QuillError> {
        match self.interpreter.evaluate_condition(condition, state, ctx) {
            Ok(value) => Ok(value),
            Err(error) if error.is_abort() => Err(error),
            Err(error) => {
                tracing::warn!(condition, error = %error, "condition failed; treated as false");
                Ok(false)
            }
        }
    }
}

/// Chooses the option for this visit and advances the site counter.
fn pick_alternative<'a>(
    mode: AlternativeMode,
    options: &'a [String],
    site: &str,
    state: &mut NarrativeState,
) -> Option<&'a str> {
    let len = u32::try_from(options.len()).ok().filter(|len| *len > 0)?;
    let seen = state.alternative_counter(site);
    let index = match mode {
        AlternativeMode::Sequential => {
            state.set_alternative_counter(site, seen.saturating_add(1).min(len));
            seen.min(len - 1)
        }
        AlternativeMode::Cyclic => {
            let index = seen % len;
            state.set_alternative_counter(site, (index + 1) % len);
            index
        }
        AlternativeMode::Random => {
            state.set_alternative_counter(site, seen.saturating_add(1));
            state.rng_mut().next_bounded(len)
        }
        AlternativeMode::Once => {
            if seen >= len {
                return None;
            }
            state.set_alternative_counter(site, seen + 1);
            seen
        }
    };
    options.get(index as usize).map(String::as_str)
}
