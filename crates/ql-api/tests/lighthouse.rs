use std::path::PathBuf;

use serde_json::json;

use ql_api::{create_session, CreateSessionOptions, Session, StoryRecord};
use ql_core::{codes, ModuleLimits, QuillConfig, Value};
use ql_loader::MemorySource;
use ql_runtime::ModuleRuntime;

const STORY: &str = r#"{
    "id": "lighthouse",
    "start": "shore",
    "variables": {"oil": 1, "lamp_lit": false},
    "passages": [
        {
            "id": "shore",
            "content": "The sea is {&calm|rough}. ${oil} oil left.",
            "lists": {"inventory": ["lamp", "rope"]},
            "choices": [
                {"id": "climb", "text": "Climb with ${oil} oil", "target": "lamp", "condition": "oil > 0"},
                {"id": "search", "text": "Search the rocks", "once": true, "action": "oil += 2"},
                {"id": "swim", "text": "Swim", "target": "lamp", "condition": "tide > 3"},
                {"id": "cellar", "text": "Peek into the cellar", "target": "cellar", "divert": "tunnel"}
            ]
        },
        {
            "id": "cellar",
            "content": "Damp and cold.",
            "choices": [
                {"id": "back", "text": "Go back up", "divert": "return", "action": "list_add(\"inventory\", \"rope\")"}
            ]
        },
        {
            "id": "lamp",
            "content": "{lighthouse.can_light()}The lamp flares.{else}Not enough oil.{/}",
            "choices": [
                {"id": "light", "text": "Light it", "action": "lighthouse.light()"}
            ]
        }
    ]
}"#;

fn modules() -> ModuleRuntime {
    ModuleRuntime::in_memory(
        ModuleLimits {
            project_root: PathBuf::from("/game"),
            ..ModuleLimits::default()
        },
        MemorySource::from_entries([(
            "/game/lighthouse.ql",
            concat!(
                "namespace lighthouse\n",
                "fn can_light() {\n",
                "    oil >= 3\n",
                "}\n",
                "fn light() {\n",
                "    oil -= 3;\n",
                "    lamp_lit = true;\n",
                "}\n",
            ),
        )]),
    )
}

fn start() -> Session {
    create_session(CreateSessionOptions {
        story: StoryRecord::from_json_str(STORY).expect("story"),
        config: QuillConfig::default(),
        modules: Some(modules()),
        includes: vec!["lighthouse".to_string()],
        random_seed: Some(9),
    })
    .expect("session")
}

fn offered(session: &mut Session) -> Vec<String> {
    session
        .available_choices()
        .expect("choices")
        .into_iter()
        .map(|choice| choice.id)
        .collect()
}

#[test]
fn play_through_with_tunnels_and_once_only_choices() {
    let mut session = start();
    assert_eq!(
        session.render_current().expect("render"),
        "The sea is calm. 1 oil left."
    );
    // `swim` fails to evaluate and is hidden rather than surfaced.
    assert_eq!(offered(&mut session), vec!["climb", "search", "cellar"]);
    assert_eq!(
        session.available_choices().expect("choices")[0].text,
        "Climb with 1 oil"
    );

    session.select_choice("search").expect("search");
    assert_eq!(session.evaluate("oil").expect("oil"), Value::from(3i64));
    assert_eq!(offered(&mut session), vec!["climb", "cellar"]);
    let error = session.select_choice("search").expect_err("used up");
    assert_eq!(error.code, codes::STORY_CHOICE_UNAVAILABLE);

    session.select_choice("cellar").expect("cellar");
    assert_eq!(session.state().current_passage(), Some("cellar"));
    assert_eq!(session.state().tunnel_depth(), 1);
    session.select_choice("back").expect("back");
    assert_eq!(session.state().current_passage(), Some("shore"));
    assert_eq!(session.state().tunnel_depth(), 0);
    assert!(session
        .state()
        .list_contains("inventory", "rope")
        .expect("inventory"));

    assert_eq!(
        session.render_current().expect("render"),
        "The sea is rough. 3 oil left."
    );

    session.select_choice("climb").expect("climb");
    assert_eq!(session.render_current().expect("render"), "The lamp flares.");
    session.select_choice("light").expect("light");
    assert_eq!(
        session.state().get_variable("lamp_lit"),
        Some(&Value::Bool(true))
    );
    assert_eq!(session.render_current().expect("render"), "Not enough oil.");

    session.undo().expect("undo");
    assert_eq!(session.state().current_passage(), Some("shore"));
    assert_eq!(session.state().get_variable("oil"), Some(&Value::from(3i64)));
    assert_eq!(
        session.state().get_variable("lamp_lit"),
        Some(&Value::Bool(false))
    );
}

#[test]
fn saves_restore_into_a_fresh_session() {
    let mut session = start();
    session.select_choice("search").expect("search");
    session.select_choice("climb").expect("climb");
    session.execute("set_temp(\"scratch\", 1)").expect("transient");
    assert!(session.state().has_temp("scratch"));
    let save = session.save().expect("save");
    assert!(save["variables"].get("scratch").is_none());

    let mut restored = start();
    restored.load(save).expect("load");
    assert_eq!(restored.state().current_passage(), Some("lamp"));
    assert_eq!(restored.state().visit_count("shore"), 1);
    assert!(restored.state().is_choice_selected("search"));
    assert_eq!(
        restored.render_current().expect("render"),
        "The lamp flares."
    );
}

#[test]
fn legacy_saves_are_migrated_on_load() {
    let mut session = start();
    session
        .load(json!({
            "version": "0.8.0",
            "story_id": "lighthouse",
            "current_passage": "lamp",
            "variables": {"oil": 4, "lamp_lit": false},
            "passage_history": ["shore", "shore", "lamp"]
        }))
        .expect("load");
    assert_eq!(session.state().visit_count("shore"), 2);
    assert_eq!(session.state().visit_count("lamp"), 1);
    assert_eq!(session.state().tunnel_depth(), 0);
    assert_eq!(
        session.render_current().expect("render"),
        "The lamp flares."
    );
}

#[test]
fn failed_choices_leave_the_session_unchanged() {
    let mut session = start();
    session.enter_passage("cellar").expect("cellar");

    let error = session.select_choice("back").expect_err("no tunnel");
    assert_eq!(error.code, codes::TUNNEL_UNDERFLOW);
    assert_eq!(session.state().current_passage(), Some("cellar"));
    assert!(!session
        .state()
        .list_contains("inventory", "rope")
        .expect("inventory"));
}
