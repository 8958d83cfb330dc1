use serde_json::{Map, Value as JsonValue};

use ql_core::{codes, QuillError};

use crate::migrator::SaveMigrator;
use crate::version::SemVer;

/// Registers the upgrade chain shipped with the engine:
/// `0.8.0 -> 0.9.0 -> 1.0.0`.
pub fn register_builtin_migrations(migrator: &mut SaveMigrator) {
    let steps: [(SemVer, SemVer, fn(JsonValue) -> Result<JsonValue, QuillError>); 2] = [
        (SemVer::new(0, 8, 0), SemVer::new(0, 9, 0), visited_from_history),
        (SemVer::new(0, 9, 0), SemVer::new(1, 0, 0), stacks_and_choices),
    ];
    for (from, to, transform) in steps {
        if let Err(error) = migrator.register(from, to, transform) {
            tracing::warn!(code = %error.code, "built-in migration skipped: {}", error.message);
        }
    }
}

fn object_mut(doc: &mut JsonValue) -> Result<&mut Map<String, JsonValue>, QuillError> {
    doc.as_object_mut()
        .ok_or_else(|| QuillError::new(codes::SAVE_MIGRATION, "Save document is not an object."))
}

/// 0.8 saves kept an ordered `passage_history`; 0.9 stores visit counts.
fn visited_from_history(mut doc: JsonValue) -> Result<JsonValue, QuillError> {
    let object = object_mut(&mut doc)?;
    let history = object.remove("passage_history");
    let mut visited = match object.remove("visited_passages") {
        Some(JsonValue::Object(existing)) => existing,
        _ => Map::new(),
    };

    if let Some(history) = history {
        let JsonValue::Array(entries) = history else {
            return Err(QuillError::new(
                codes::SAVE_MIGRATION,
                "passage_history must be an array of passage ids.",
            ));
        };
        for entry in entries {
            let Some(passage) = entry.as_str() else {
                return Err(QuillError::new(
                    codes::SAVE_MIGRATION,
                    "passage_history must only contain strings.",
                ));
            };
            let count = visited
                .get(passage)
                .and_then(JsonValue::as_u64)
                .unwrap_or(0);
            visited.insert(passage.to_string(), JsonValue::from(count + 1));
        }
    }

    object.insert("visited_passages".to_string(), JsonValue::Object(visited));
    Ok(doc)
}

/// 1.0 requires the tunnel stack and once-only choice ids to be present.
fn stacks_and_choices(mut doc: JsonValue) -> Result<JsonValue, QuillError> {
    let object = object_mut(&mut doc)?;
    for key in ["tunnel_stack", "selected_choices"] {
        match object.get(key) {
            None | Some(JsonValue::Null) => {
                object.insert(key.to_string(), JsonValue::Array(Vec::new()));
            }
            Some(_) => {}
        }
    }
    if !object.contains_key("collections") {
        object.insert("collections".to_string(), JsonValue::Object(Map::new()));
    }
    Ok(doc)
}

#[cfg(test)]
mod legacy_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_counts_become_visits() {
        let migrated = visited_from_history(json!({
            "version": "0.8.0",
            "passage_history": ["start", "hall", "start"]
        }))
        .expect("migrate");
        assert_eq!(migrated["visited_passages"], json!({"start": 2, "hall": 1}));
        assert!(migrated.get("passage_history").is_none());
    }

    #[test]
    fn malformed_history_is_a_migration_error() {
        let error = visited_from_history(json!({"passage_history": [1]})).expect_err("bad");
        assert_eq!(error.code, codes::SAVE_MIGRATION);
    }

    #[test]
    fn existing_stacks_are_kept() {
        let migrated = stacks_and_choices(json!({
            "tunnel_stack": [{"return_passage": "a", "position": 1}]
        }))
        .expect("migrate");
        assert_eq!(migrated["tunnel_stack"][0]["return_passage"], json!("a"));
        assert_eq!(migrated["selected_choices"], json!([]));
    }
}
