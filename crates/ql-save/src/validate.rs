use serde_json::Value as JsonValue;

use ql_core::{codes, ErrorDetail, QuillError};

use crate::version::SemVer;

/// Checks the structure of a (migrated) save document, reporting every
/// violation in one error.
pub fn validate(doc: &JsonValue) -> Result<(), QuillError> {
    let violations = validate_document(doc);
    if violations.is_empty() {
        return Ok(());
    }
    Err(QuillError::new(
        codes::SAVE_VALIDATION,
        format!("Save document has {} violation(s).", violations.len()),
    )
    .detail(ErrorDetail::Violations { violations }))
}

pub fn validate_document(doc: &JsonValue) -> Vec<String> {
    let mut out = Vec::new();
    let Some(object) = doc.as_object() else {
        out.push("document must be an object".to_string());
        return out;
    };

    match object.get("version").and_then(JsonValue::as_str) {
        Some(raw) if SemVer::parse(raw).is_ok() => {}
        Some(raw) => out.push(format!("version \"{}\" is not major.minor.patch", raw)),
        None => out.push("version must be a string".to_string()),
    }

    match object.get("story_id") {
        Some(JsonValue::String(id)) if !id.is_empty() => {}
        _ => out.push("story_id must be a non-empty string".to_string()),
    }

    match object.get("current_passage") {
        None | Some(JsonValue::Null) | Some(JsonValue::String(_)) => {}
        Some(_) => out.push("current_passage must be a string or null".to_string()),
    }

    match object.get("variables") {
        None => {}
        Some(JsonValue::Object(variables)) => {
            for name in variables.keys() {
                if name.is_empty() {
                    out.push("variables contains an empty name".to_string());
                }
            }
        }
        Some(_) => out.push("variables must be an object".to_string()),
    }

    match object.get("visited_passages") {
        None => {}
        Some(JsonValue::Object(visited)) => {
            for (passage, count) in visited {
                if count.as_u64().map_or(true, |count| count > u64::from(u32::MAX)) {
                    out.push(format!(
                        "visited_passages.{} must be a non-negative integer",
                        passage
                    ));
                }
            }
        }
        Some(_) => out.push("visited_passages must be an object".to_string()),
    }

    match object.get("selected_choices") {
        None => {}
        Some(JsonValue::Array(choices)) => {
            for (index, choice) in choices.iter().enumerate() {
                if !choice.is_string() {
                    out.push(format!("selected_choices[{}] must be a string", index));
                }
            }
        }
        Some(_) => out.push("selected_choices must be an array".to_string()),
    }

    match object.get("tunnel_stack") {
        None => {}
        Some(JsonValue::Array(frames)) => {
            for (index, frame) in frames.iter().enumerate() {
                if !frame
                    .get("return_passage")
                    .map_or(false, JsonValue::is_string)
                {
                    out.push(format!(
                        "tunnel_stack[{}].return_passage must be a string",
                        index
                    ));
                }
                if let Some(position) = frame.get("position") {
                    if position.as_u64().is_none() {
                        out.push(format!(
                            "tunnel_stack[{}].position must be a non-negative integer",
                            index
                        ));
                    }
                }
            }
            let limit = object
                .get("tunnel_depth_limit")
                .and_then(JsonValue::as_u64);
            if let Some(limit) = limit {
                if frames.len() as u64 > limit {
                    out.push(format!(
                        "tunnel_stack holds {} frames, above tunnel_depth_limit {}",
                        frames.len(),
                        limit
                    ));
                }
            }
        }
        Some(_) => out.push("tunnel_stack must be an array".to_string()),
    }

    if let Some(limit) = object.get("tunnel_depth_limit") {
        if limit.as_u64().map_or(true, |limit| limit == 0) {
            out.push("tunnel_depth_limit must be a positive integer".to_string());
        }
    }

    match object.get("collections") {
        None => {}
        Some(JsonValue::Object(collections)) => {
            for (name, collection) in collections {
                validate_collection(name, collection, &mut out);
            }
        }
        Some(_) => out.push("collections must be an object".to_string()),
    }

    if let Some(rng) = object.get("rng") {
        for field in ["seed", "state"] {
            let valid = rng
                .get(field)
                .and_then(JsonValue::as_u64)
                .map_or(false, |value| value <= u64::from(u32::MAX));
            if !valid {
                out.push(format!("rng.{} must be a 32-bit unsigned integer", field));
            }
        }
    }

    out
}

fn validate_collection(name: &str, collection: &JsonValue, out: &mut Vec<String>) {
    match collection.get("kind").and_then(JsonValue::as_str) {
        Some("list") => {
            let domain = collection.get("domain").and_then(JsonValue::as_array);
            let Some(domain) = domain else {
                out.push(format!("collections.{}.domain must be an array", name));
                return;
            };
            if let Some(active) = collection.get("active") {
                let Some(active) = active.as_array() else {
                    out.push(format!("collections.{}.active must be an array", name));
                    return;
                };
                for entry in active {
                    if !domain.contains(entry) {
                        out.push(format!(
                            "collections.{}.active value {} is outside the declared domain",
                            name, entry
                        ));
                    }
                }
            }
        }
        Some("array") => {
            if collection.get("items").map_or(false, |items| !items.is_array()) {
                out.push(format!("collections.{}.items must be an array", name));
            }
        }
        Some("map") => {
            if collection
                .get("entries")
                .map_or(false, |entries| !entries.is_object())
            {
                out.push(format!("collections.{}.entries must be an object", name));
            }
        }
        Some(other) => out.push(format!(
            "collections.{} has unknown kind \"{}\"",
            name, other
        )),
        None => out.push(format!("collections.{} is missing its kind", name)),
    }
}
