use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ql_core::{codes, QuillError, SourceSpan};
use regex::Regex;

/// `include "path"` directive as written in a module file.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    pub reference: String,
    pub span: SourceSpan,
}

/// A function body lifted out of a module file. `name` is already
/// qualified with the file's `namespace` directive, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSource {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedModule {
    pub path: PathBuf,
    pub namespace: Option<String>,
    pub includes: Vec<IncludeDirective>,
    pub functions: Vec<FunctionSource>,
}

/// Pluggable module-file reader. The runtime only needs includes and
/// function definitions back.
pub trait ModuleParser {
    fn parse(&self, path: &Path, source: &str) -> Result<ParsedModule, QuillError>;
}

/// Reader for the line-oriented module format:
///
/// ```text
/// // comment
/// include "shared/dice"
/// namespace combat
/// fn damage(base, armor) {
///     base - armor
/// }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct DefinitionParser;

fn include_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"^include[ \t]+"((?:\\.|[^"\\\n])*)"[ \t]*(?:;)?"#)
            .expect("include regex must compile")
    })
}

fn namespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^namespace[ \t]+([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)")
            .expect("namespace regex must compile")
    })
}

fn function_header_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^fn\s+([A-Za-z_][A-Za-z0-9_.]*)\s*\(([^)]*)\)\s*\{")
            .expect("function header regex must compile")
    })
}

fn identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
    })
}

pub fn is_identifier(text: &str) -> bool {
    identifier_regex().is_match(text)
}

impl ModuleParser for DefinitionParser {
    fn parse(&self, path: &Path, source: &str) -> Result<ParsedModule, QuillError> {
        let file = path.display().to_string();
        let mut module = ParsedModule {
            path: path.to_path_buf(),
            ..ParsedModule::default()
        };
        let mut pos = 0usize;

        loop {
            pos = skip_trivia(source, pos);
            if pos >= source.len() {
                break;
            }
            let rest = &source[pos..];
            let span = SourceSpan::from_offset(Some(file.clone()), source, pos);

            if let Some(captures) = include_regex().captures(rest) {
                let whole = captures.get(0).map_or(0, |m| m.end());
                let reference = captures
                    .get(1)
                    .map_or("", |m| m.as_str())
                    .replace("\\\"", "\"");
                if reference.trim().is_empty() {
                    return Err(parse_error("Include path is empty.", span));
                }
                module.includes.push(IncludeDirective { reference, span });
                pos = expect_line_end(source, pos + whole, &file)?;
                continue;
            }

            if let Some(captures) = namespace_regex().captures(rest) {
                let whole = captures.get(0).map_or(0, |m| m.end());
                module.namespace = captures.get(1).map(|m| m.as_str().to_string());
                pos = expect_line_end(source, pos + whole, &file)?;
                continue;
            }

            if let Some(captures) = function_header_regex().captures(rest) {
                let header_end = pos + captures.get(0).map_or(0, |m| m.end());
                let raw_name = captures.get(1).map_or("", |m| m.as_str());
                if !raw_name.split('.').all(is_identifier) {
                    return Err(parse_error(
                        format!("Invalid function name \"{}\".", raw_name),
                        span,
                    ));
                }
                let params = parse_params(captures.get(2).map_or("", |m| m.as_str()), &span)?;
                let body_end = find_closing_brace(source, header_end).ok_or_else(|| {
                    parse_error(
                        format!("Function \"{}\" is missing its closing brace.", raw_name),
                        span.clone(),
                    )
                })?;
                let name = match &module.namespace {
                    Some(namespace) => format!("{}.{}", namespace, raw_name),
                    None => raw_name.to_string(),
                };
                if module.functions.iter().any(|existing| existing.name == name) {
                    return Err(parse_error(
                        format!("Function \"{}\" is defined twice in this file.", name),
                        span,
                    ));
                }
                module.functions.push(FunctionSource {
                    name,
                    params,
                    body: source[header_end..body_end].trim().to_string(),
                    span,
                });
                pos = body_end + 1;
                continue;
            }

            let word: String = rest
                .chars()
                .take_while(|ch| !ch.is_whitespace())
                .take(24)
                .collect();
            return Err(parse_error(
                format!("Unexpected \"{}\" at module top level.", word),
                span,
            )
            .suggest("Top level accepts include, namespace, fn and comments."));
        }

        tracing::trace!(
            file = %file,
            includes = module.includes.len(),
            functions = module.functions.len(),
            "module parsed"
        );
        Ok(module)
    }
}

fn parse_error(message: impl Into<String>, span: SourceSpan) -> QuillError {
    QuillError::with_span(codes::INCLUDE_PARSE_ERROR, message, span)
}

fn parse_params(raw: &str, span: &SourceSpan) -> Result<Vec<String>, QuillError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let mut params: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let name = part.trim();
        if !is_identifier(name) {
            return Err(parse_error(
                format!("Invalid parameter name \"{}\".", name),
                span.clone(),
            ));
        }
        if params.iter().any(|existing| existing == name) {
            return Err(parse_error(
                format!("Parameter \"{}\" is declared twice.", name),
                span.clone(),
            ));
        }
        params.push(name.to_string());
    }
    Ok(params)
}

/// Skips whitespace, `//`, `#` and `/* */` comments.
fn skip_trivia(source: &str, mut pos: usize) -> usize {
    let bytes = source.as_bytes();
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'#' => pos = line_end(source, pos),
            b'/' if bytes.get(pos + 1) == Some(&b'/') => pos = line_end(source, pos),
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos = source[pos + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |end| pos + 2 + end + 2);
            }
            _ => break,
        }
    }
    pos
}

fn line_end(source: &str, pos: usize) -> usize {
    source[pos..].find('\n').map_or(source.len(), |end| pos + end)
}

/// Directives own the whole line; only trailing comments may follow.
fn expect_line_end(source: &str, pos: usize, file: &str) -> Result<usize, QuillError> {
    let end = line_end(source, pos);
    let tail = source[pos..end].trim();
    if tail.is_empty() || tail.starts_with("//") || tail.starts_with('#') {
        return Ok(end);
    }
    Err(parse_error(
        format!("Unexpected \"{}\" after directive.", tail),
        SourceSpan::from_offset(Some(file.to_string()), source, pos),
    ))
}

/// Byte offset of the brace closing the block opened just before `start`.
/// String literals, character literals and comments are skipped.
fn find_closing_brace(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 1usize;
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            quote @ (b'"' | b'\'' | b'`') => {
                pos += 1;
                while pos < bytes.len() && bytes[pos] != quote {
                    if bytes[pos] == b'\\' {
                        pos += 1;
                    }
                    pos += 1;
                }
            }
            b'/' if bytes.get(pos + 1) == Some(&b'/') => {
                pos = line_end(source, pos);
                continue;
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos = source[pos + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |end| pos + 2 + end + 1);
            }
            _ => {}
        }
        pos += 1;
    }
    None
}
