//! Splits passage content into literal text, interpolation markers and
//! brace tags.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternativeMode {
    /// No sigil: advances once per visit and sticks at the last option.
    Sequential,
    /// `&`: wraps around.
    Cyclic,
    /// `~`: uniform draw on every visit.
    Random,
    /// `!`: each option once, then nothing.
    Once,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagKind {
    Open(String),
    Elif(String),
    Else,
    Close,
    Inline {
        condition: String,
        when_true: String,
        when_false: String,
    },
    Alternatives {
        mode: AlternativeMode,
        options: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub kind: TagKind,
    /// The tag exactly as written, braces included.
    pub raw: String,
    /// Byte offset of the opening brace in the content.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    /// A `${...}` marker, kept verbatim.
    Interpolation(String),
    Tag(Tag),
}

pub fn tokenize(content: &str) -> Vec<Token> {
    let bytes = content.as_bytes();
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut run_start = 0usize;
    let mut pos = 0usize;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' if matches!(bytes.get(pos + 1), Some(b'{') | Some(b'}')) => {
                text.push_str(&content[run_start..pos]);
                text.push(bytes[pos + 1] as char);
                pos += 2;
                run_start = pos;
            }
            b'$' if bytes.get(pos + 1) == Some(&b'{') => match find_close(bytes, pos + 1) {
                Some(end) => {
                    text.push_str(&content[run_start..pos]);
                    flush(&mut tokens, &mut text);
                    tokens.push(Token::Interpolation(content[pos..=end].to_string()));
                    pos = end + 1;
                    run_start = pos;
                }
                None => pos += 2,
            },
            b'{' => match find_close(bytes, pos) {
                Some(end) => {
                    text.push_str(&content[run_start..pos]);
                    let raw = &content[pos..=end];
                    match classify(&content[pos + 1..end]) {
                        Some(kind) => {
                            flush(&mut tokens, &mut text);
                            tokens.push(Token::Tag(Tag {
                                kind,
                                raw: raw.to_string(),
                                offset: pos,
                            }));
                        }
                        None => text.push_str(raw),
                    }
                    pos = end + 1;
                    run_start = pos;
                }
                None => pos += 1,
            },
            _ => pos += 1,
        }
    }
    text.push_str(&content[run_start..]);
    flush(&mut tokens, &mut text);
    tokens
}

fn flush(tokens: &mut Vec<Token>, text: &mut String) {
    if text.is_empty() {
        return;
    }
    let text = std::mem::take(text);
    if let Some(Token::Text(previous)) = tokens.last_mut() {
        previous.push_str(&text);
    } else {
        tokens.push(Token::Text(text));
    }
}

/// Index of the `}` matching the `{` at `open`, honouring nesting,
/// backslash escapes and double-quoted strings. A quote with no partner is
/// plain text.
fn find_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = open;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 1,
            b'"' => {
                if let Some(end) = closing_quote(bytes, pos) {
                    pos = end;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
        pos += 1;
    }
    None
}

fn closing_quote(bytes: &[u8], open: usize) -> Option<usize> {
    let mut pos = open + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 1,
            b'"' => return Some(pos),
            _ => {}
        }
        pos += 1;
    }
    None
}

/// Byte positions of `separator` outside brackets, paired double quotes
/// and escapes. `||` and `::` never count as separators.
fn top_level(inner: &str, separator: u8) -> Vec<usize> {
    let bytes = inner.as_bytes();
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut pos = 0usize;
    while pos < bytes.len() {
        let byte = bytes[pos];
        if byte == b'\\' {
            pos += 2;
            continue;
        }
        match byte {
            b'"' => {
                if let Some(end) = closing_quote(bytes, pos) {
                    pos = end;
                }
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ if byte == separator && depth == 0 => {
                if bytes.get(pos + 1) == Some(&separator) {
                    pos += 2;
                    continue;
                }
                found.push(pos);
            }
            _ => {}
        }
        pos += 1;
    }
    found
}

fn split_at_positions<'a>(text: &'a str, positions: &[usize]) -> Vec<&'a str> {
    let mut parts = Vec::with_capacity(positions.len() + 1);
    let mut start = 0usize;
    for &at in positions {
        parts.push(&text[start..at]);
        start = at + 1;
    }
    parts.push(&text[start..]);
    parts
}

/// Resolves `\|`, `\:`, `\{` and `\}` inside branch or option text.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '|' | ':' | '{' | '}') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

fn alternatives(mode: AlternativeMode, body: &str) -> TagKind {
    let options = split_at_positions(body, &top_level(body, b'|'))
        .into_iter()
        .map(|option| unescape(option.trim()))
        .collect();
    TagKind::Alternatives { mode, options }
}

/// Decides what a brace tag is. `None` means the braces are plain text.
fn classify(inner: &str) -> Option<TagKind> {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed {
        "/" => return Some(TagKind::Close),
        "else" => return Some(TagKind::Else),
        _ => {}
    }
    if let Some(condition) = trimmed.strip_prefix("elif ") {
        return Some(TagKind::Elif(condition.trim().to_string()));
    }

    let pipes = top_level(trimmed, b'|');
    if !pipes.is_empty() {
        if let Some(body) = trimmed.strip_prefix('&') {
            return Some(alternatives(AlternativeMode::Cyclic, body));
        }
        if let Some(body) = trimmed.strip_prefix('~') {
            return Some(alternatives(AlternativeMode::Random, body));
        }
    }

    if !trimmed.contains('\n') {
        if let Some(&colon) = top_level(trimmed, b':').first() {
            let condition = trimmed[..colon].trim().to_string();
            let branches = &trimmed[colon + 1..];
            let (when_true, when_false) = match top_level(branches, b'|').first() {
                Some(&bar) => (&branches[..bar], &branches[bar + 1..]),
                None => (branches, ""),
            };
            return Some(TagKind::Inline {
                condition,
                when_true: unescape(when_true.trim()),
                when_false: unescape(when_false.trim()),
            });
        }
    }

    if !pipes.is_empty() {
        return Some(match trimmed.strip_prefix('!') {
            Some(body) => alternatives(AlternativeMode::Once, body),
            None => alternatives(AlternativeMode::Sequential, trimmed),
        });
    }
    Some(TagKind::Open(trimmed.to_string()))
}
