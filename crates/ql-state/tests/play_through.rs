use ql_core::{codes, Collection, StateLimits, Value};
use ql_save::SaveMigrator;
use ql_state::{NarrativeState, TunnelFrame};

fn limits() -> StateLimits {
    StateLimits {
        max_history: 10,
        max_tunnel_depth: 3,
    }
}

#[test]
fn undo_walks_back_through_transitions() {
    let mut state = NarrativeState::with_seed("tale", limits(), 11);
    state
        .declare_collection("items", Collection::array(Vec::new()))
        .expect("array");

    let mut recorded = Vec::new();
    for step in 1..=5i64 {
        state.set_variable("step", Value::from(step)).expect("var");
        state
            .array_push("items", Value::from(step))
            .expect("push");
        if step % 2 == 0 {
            state
                .push_tunnel(TunnelFrame::new(format!("p{}", step), 0))
                .expect("tunnel");
        }
        recorded.push(state.snapshot());
        state.set_current_passage(&format!("p{}", step));
    }

    for undo_count in 1..=5usize {
        state.undo().expect("undo");
        let expected = &recorded[5 - undo_count];
        assert_eq!(state.snapshot().variables, expected.variables);
        assert_eq!(state.snapshot().visited, expected.visited);
        assert_eq!(state.snapshot().collections, expected.collections);
        assert_eq!(state.tunnel().frames(), expected.tunnel.as_slice());
    }
    assert!(!state.can_undo());
}

#[test]
fn history_is_bounded() {
    let mut state = NarrativeState::with_seed("tale", limits(), 1);
    for step in 0..25 {
        state.set_current_passage(&format!("p{}", step));
    }
    assert_eq!(state.history_len(), 10);
}

#[test]
fn tunnel_limit_is_a_hard_failure() {
    let mut state = NarrativeState::with_seed("tale", limits(), 1);
    for index in 0..3 {
        state
            .push_tunnel(TunnelFrame::new("hub", index))
            .expect("push");
    }
    let error = state
        .push_tunnel(TunnelFrame::new("hub", 9))
        .expect_err("overflow");
    assert_eq!(error.code, codes::TUNNEL_OVERFLOW);
    assert!(error.is_abort());
    assert_eq!(state.tunnel_depth(), 3);
    assert_eq!(state.peek_tunnel().map(|frame| frame.position), Some(2));
}

#[test]
fn save_round_trip_is_lossless() {
    let mut state = NarrativeState::with_seed("tale", limits(), 21);
    state.set_variable("name", Value::from("Ada")).expect("var");
    state.set_temp("scratch", Value::from(true)).expect("temp");
    state
        .declare_collection("keys", Collection::list(["brass", "iron"]))
        .expect("list");
    state.list_add("keys", "iron").expect("add");
    state.set_current_passage("gate");
    state.mark_choice_selected("gate:knock");
    state
        .push_tunnel(TunnelFrame::new("gate", 4))
        .expect("tunnel");
    state.set_alternative_counter("gate:12", 2);
    let _ = state.random_range(1, 100).expect("draw");

    let saved = state.serialize_json().expect("encode");
    let text = serde_json::to_string(&saved).expect("text");
    let mut loaded = NarrativeState::with_seed("other", limits(), 0);
    loaded
        .deserialize(
            serde_json::from_str(&text).expect("parse"),
            &SaveMigrator::with_builtin(),
        )
        .expect("load");

    assert_eq!(loaded.story_id(), "tale");
    assert_eq!(loaded.get_variable("name"), Some(&Value::from("Ada")));
    assert!(loaded.get_temp("scratch").is_none());
    assert!(loaded.list_contains("keys", "iron").expect("contains"));
    assert_eq!(loaded.current_passage(), Some("gate"));
    assert!(loaded.is_choice_selected("gate:knock"));
    assert_eq!(loaded.peek_tunnel().map(|f| f.position), Some(4));
    assert_eq!(loaded.alternative_counter("gate:12"), 2);
    assert_eq!(loaded.rng(), state.rng());
    assert_eq!(loaded.random_range(1, 100).ok(), state.random_range(1, 100).ok());
    assert!(!loaded.can_undo());
}
