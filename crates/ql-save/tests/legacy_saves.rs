use ql_core::codes;
use ql_save::{validate, SaveDocument, SaveMigrator, SAVE_FORMAT_VERSION};
use serde_json::json;

#[test]
fn v0_8_save_migrates_to_current() {
    let legacy = json!({
        "version": "0.8.0",
        "story_id": "lighthouse",
        "current_passage": "cliff",
        "variables": {"lamp_lit": true, "oil": 3},
        "passage_history": ["shore", "stairs", "shore", "cliff"]
    });

    let migrator = SaveMigrator::with_builtin();
    assert!(migrator.needs_migration(&legacy).expect("version"));
    let migrated = migrator.migrate(legacy).expect("migrate");
    validate(&migrated).expect("valid after migration");

    let document = SaveDocument::from_json(migrated).expect("decode");
    assert_eq!(document.version, SAVE_FORMAT_VERSION);
    assert_eq!(document.visited_passages.get("shore"), Some(&2));
    assert_eq!(document.visited_passages.get("cliff"), Some(&1));
    assert!(document.tunnel_stack.is_empty());
    assert!(document.selected_choices.is_empty());
    assert_eq!(document.current_passage.as_deref(), Some("cliff"));
}

#[test]
fn v0_9_save_keeps_existing_choices() {
    let migrated = SaveMigrator::with_builtin()
        .migrate(json!({
            "version": "0.9.0",
            "story_id": "lighthouse",
            "visited_passages": {"shore": 1},
            "selected_choices": ["shore:ask"]
        }))
        .expect("migrate");
    assert_eq!(migrated["selected_choices"], json!(["shore:ask"]));
    assert_eq!(migrated["tunnel_stack"], json!([]));
}

#[test]
fn unknown_old_version_has_no_chain() {
    let error = SaveMigrator::with_builtin()
        .migrate(json!({"version": "0.7.0", "story_id": "x"}))
        .expect_err("no chain from 0.7");
    assert_eq!(error.code, codes::SAVE_MIGRATION);
}
