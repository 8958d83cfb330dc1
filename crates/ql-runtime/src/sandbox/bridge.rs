use std::collections::BTreeMap;

use ql_core::{codes, QuillError, SourceSpan, Value};
use rhai::{Array, Dynamic, EvalAltResult, ImmutableString, Map, ParseError, Position, FLOAT, INT};

/// Integral numbers cross over as `INT` so `%`, ranges and indexing work.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

pub(crate) fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Nil => Dynamic::UNIT,
        Value::Bool(value) => Dynamic::from_bool(*value),
        Value::Number(value) => {
            if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INT {
                Dynamic::from_int(*value as INT)
            } else {
                Dynamic::from_float(*value as FLOAT)
            }
        }
        Value::String(value) => Dynamic::from(value.clone()),
        Value::Array(values) => {
            Dynamic::from_array(values.iter().map(value_to_dynamic).collect::<Array>())
        }
        Value::Map(values) => {
            let mut map = Map::new();
            for (key, value) in values {
                map.insert(key.as_str().into(), value_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
    }
}

pub(crate) fn dynamic_to_value(value: Dynamic) -> Result<Value, QuillError> {
    let value = value.flatten();
    if value.is_shared() {
        // Still shared after flattening means the slot is locked for writing.
        return Err(QuillError::new(
            codes::SCRIPT_RUNTIME,
            "A variable was read while it was being assigned.",
        ));
    }
    if value.is_unit() {
        return Ok(Value::Nil);
    }
    if value.is::<bool>() {
        return Ok(Value::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(Value::Number(value.cast::<INT>() as f64));
    }
    if value.is::<FLOAT>() {
        return Ok(Value::Number(value.cast::<FLOAT>()));
    }
    if value.is::<ImmutableString>() {
        return Ok(Value::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<char>() {
        return Ok(Value::String(value.cast::<char>().to_string()));
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            out.push(dynamic_to_value(item)?);
        }
        return Ok(Value::Array(out));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        let mut out = BTreeMap::new();
        for (key, value) in map {
            out.insert(key.to_string(), dynamic_to_value(value)?);
        }
        return Ok(Value::Map(out));
    }

    Err(QuillError::new(
        codes::SCRIPT_VALUE_UNSUPPORTED,
        format!(
            "Script produced a \"{}\" value, which cannot be stored.",
            value.type_name()
        ),
    ))
}

pub(crate) fn number_arg(value: &Dynamic) -> Option<f64> {
    if value.is::<INT>() {
        return Some(value.clone().cast::<INT>() as f64);
    }
    if value.is::<FLOAT>() {
        return Some(value.clone().cast::<FLOAT>());
    }
    None
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_ident_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut pos = start + 1;
    while pos < bytes.len() && bytes[pos] != quote {
        if bytes[pos] == b'\\' {
            pos += 1;
        }
        pos += 1;
    }
    (pos + 1).min(bytes.len())
}

/// Rewrites `name(args)` into `invoke("qualified", args)` for every dotted
/// name `resolve` recognises. String literals, comments, method calls and
/// `fn` declarations are left alone.
pub(crate) fn rewrite_module_calls<F>(source: &str, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut last = 0usize;
    let mut pos = 0usize;
    let mut previous_word: Option<&str> = None;

    while pos < bytes.len() {
        let byte = bytes[pos];
        if byte == b'"' || byte == b'\'' || byte == b'`' {
            pos = skip_quoted(bytes, pos);
            previous_word = None;
            continue;
        }
        if byte == b'/' && bytes.get(pos + 1) == Some(&b'/') {
            pos = source[pos..].find('\n').map_or(bytes.len(), |end| pos + end);
            continue;
        }
        if byte == b'/' && bytes.get(pos + 1) == Some(&b'*') {
            pos = source[pos + 2..]
                .find("*/")
                .map_or(bytes.len(), |end| pos + 2 + end + 2);
            continue;
        }

        let boundary = pos == 0 || !(is_ident_char(bytes[pos - 1]) || bytes[pos - 1] == b'.');
        if !(is_ident_start(byte) && boundary) {
            if !byte.is_ascii_whitespace() {
                previous_word = None;
            }
            pos += 1;
            continue;
        }

        let start = pos;
        pos += 1;
        loop {
            while pos < bytes.len() && is_ident_char(bytes[pos]) {
                pos += 1;
            }
            if pos + 1 < bytes.len() && bytes[pos] == b'.' && is_ident_start(bytes[pos + 1]) {
                pos += 1;
                continue;
            }
            break;
        }
        let name = &source[start..pos];

        let mut open = pos;
        while open < bytes.len() && (bytes[open] == b' ' || bytes[open] == b'\t') {
            open += 1;
        }
        let is_call = open < bytes.len() && bytes[open] == b'(' && previous_word != Some("fn");
        if let Some(qualified) = is_call.then(|| resolve(name)).flatten() {
            out.push_str(&source[last..start]);
            let mut close = open + 1;
            while close < bytes.len() && bytes[close].is_ascii_whitespace() {
                close += 1;
            }
            if close < bytes.len() && bytes[close] == b')' {
                out.push_str(&format!("invoke({:?})", qualified));
                last = close + 1;
            } else {
                out.push_str(&format!("invoke({:?}, ", qualified));
                last = open + 1;
            }
            pos = last;
            previous_word = None;
            continue;
        }
        previous_word = Some(name);
    }

    out.push_str(&source[last..]);
    out
}

pub(crate) fn position_span(position: Position, source: Option<&str>) -> Option<SourceSpan> {
    let line = position.line()?;
    let column = position.position().unwrap_or(1);
    Some(SourceSpan::point(source.map(str::to_string), line, column))
}

pub(crate) fn compile_error(error: &ParseError, source: Option<&str>) -> QuillError {
    QuillError::new(
        codes::SCRIPT_COMPILE,
        format!("Script failed to compile: {}", error.0),
    )
    .at(position_span(error.1, source))
}

/// Innermost error once rhai's function-call wrappers are peeled off.
pub(crate) fn root_cause(error: &EvalAltResult) -> &EvalAltResult {
    match error {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => root_cause(inner),
        other => other,
    }
}

pub(crate) fn eval_error(error: &EvalAltResult, source: Option<&str>) -> QuillError {
    let root = root_cause(error);
    let code = match root {
        EvalAltResult::ErrorTooManyOperations(_)
        | EvalAltResult::ErrorDataTooLarge(..)
        | EvalAltResult::ErrorStackOverflow(_)
        | EvalAltResult::ErrorTerminated(..) => codes::SCRIPT_RESOURCE_LIMIT,
        EvalAltResult::ErrorParsing(..) => codes::SCRIPT_COMPILE,
        _ => codes::SCRIPT_RUNTIME,
    };
    QuillError::new(code, root.to_string()).at(position_span(error.position(), source))
}

#[cfg(test)]
mod bridge_tests {
    use super::*;

    fn known(name: &str) -> Option<String> {
        match name {
            "damage" => Some("combat.damage".to_string()),
            "combat.heal" | "tick" => Some(name.to_string()),
            _ => None,
        }
    }

    #[test]
    fn integral_numbers_become_ints() {
        assert!(value_to_dynamic(&Value::Number(3.0)).is::<INT>());
        assert!(value_to_dynamic(&Value::Number(3.5)).is::<FLOAT>());
        assert!(value_to_dynamic(&Value::Nil).is_unit());
    }

    #[test]
    fn dynamic_values_convert_back() {
        let mut map = Map::new();
        map.insert("k".into(), Dynamic::from_int(2));
        let array: Array = vec![Dynamic::from_bool(true), Dynamic::from_map(map), Dynamic::UNIT];
        let value = dynamic_to_value(Dynamic::from_array(array)).expect("convert");
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Bool(true),
                Value::Map(BTreeMap::from([("k".to_string(), Value::Number(2.0))])),
                Value::Nil,
            ])
        );
        assert_eq!(
            dynamic_to_value(Dynamic::from('x')).expect("char"),
            Value::from("x")
        );
    }

    #[test]
    fn unsupported_dynamic_is_reported() {
        let error = dynamic_to_value(Dynamic::from(std::time::Duration::from_secs(1)))
            .expect_err("unsupported");
        assert_eq!(error.code, codes::SCRIPT_VALUE_UNSUPPORTED);
    }

    #[test]
    fn rewrites_known_calls_only() {
        assert_eq!(
            rewrite_module_calls("damage(3, 1) + combat.heal (2) + other(1)", known),
            r#"invoke("combat.damage", 3, 1) + invoke("combat.heal", 2) + other(1)"#
        );
        assert_eq!(rewrite_module_calls("tick()", known), r#"invoke("tick")"#);
    }

    #[test]
    fn rewrite_skips_strings_methods_and_definitions() {
        let source = r#"let s = "damage(1)"; x.damage(2); fn tick() { 1 } // damage(3)"#;
        assert_eq!(rewrite_module_calls(source, known), source);
    }
}
