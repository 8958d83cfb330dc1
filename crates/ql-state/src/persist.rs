use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::Value as JsonValue;

use ql_core::{codes, QuillError};
use ql_save::{validate, RngRecord, SaveDocument, SaveMigrator, SAVE_FORMAT_VERSION};

use crate::history::History;
use crate::rng::RandomState;
use crate::state::NarrativeState;
use crate::tunnel::{TunnelFrame, TunnelStack};

impl NarrativeState {
    pub fn serialize(&self) -> SaveDocument {
        SaveDocument {
            version: SAVE_FORMAT_VERSION.to_string(),
            story_id: self.story_id.clone(),
            created_at: Some(self.started_at),
            saved_at: Some(Utc::now()),
            current_passage: self.current_passage.clone(),
            variables: self.variables.clone(),
            visited_passages: self.visited.clone(),
            selected_choices: self.selected_choices.iter().cloned().collect(),
            collections: self.collections.clone(),
            tunnel_stack: self
                .tunnel
                .frames()
                .iter()
                .map(TunnelFrame::to_record)
                .collect(),
            tunnel_depth_limit: self.tunnel.limit(),
            rng: RngRecord {
                seed: self.rng.seed(),
                state: self.rng.state(),
            },
        }
    }

    pub fn serialize_json(&self) -> Result<JsonValue, QuillError> {
        self.serialize().to_json()
    }

    /// Migrates (when the version differs), validates, then replaces this
    /// state in one step. On any error the state is left as it was.
    pub fn deserialize(
        &mut self,
        document: JsonValue,
        migrator: &SaveMigrator,
    ) -> Result<(), QuillError> {
        let document = if migrator.needs_migration(&document)? {
            migrator.migrate(document)?
        } else {
            document
        };
        validate(&document)?;
        let document = SaveDocument::from_json(document)?;
        let restored = Self::from_document(document, self.history.max())?;
        *self = restored;
        tracing::debug!(story = %self.story_id, "state restored from save");
        Ok(())
    }

    fn from_document(document: SaveDocument, max_history: usize) -> Result<Self, QuillError> {
        let mut tunnel = TunnelStack::new(document.tunnel_depth_limit);
        if document.tunnel_stack.len() > tunnel.limit() {
            return Err(QuillError::new(
                codes::SAVE_VALIDATION,
                "Saved tunnel stack is deeper than its depth limit.",
            ));
        }
        tunnel.replace_frames(
            document
                .tunnel_stack
                .into_iter()
                .map(TunnelFrame::from_record)
                .collect(),
        );

        Ok(Self {
            story_id: document.story_id,
            started_at: document.created_at.unwrap_or_else(Utc::now),
            variables: document.variables,
            temps: Default::default(),
            collections: document.collections,
            current_passage: document.current_passage,
            visited: document.visited_passages,
            selected_choices: document
                .selected_choices
                .into_iter()
                .collect::<BTreeSet<_>>(),
            tunnel,
            history: History::new(max_history),
            rng: RandomState::restore(document.rng.seed, document.rng.state),
        })
    }
}

#[cfg(test)]
mod persist_tests {
    use super::*;
    use ql_core::{Collection, StateLimits, Value};
    use serde_json::json;

    #[test]
    fn failed_load_leaves_state_untouched() {
        let mut state = NarrativeState::with_seed("tale", StateLimits::default(), 5);
        state.set_variable("gold", Value::from(3i64)).expect("var");
        state.set_current_passage("start");
        let before = state.serialize();

        let error = state
            .deserialize(
                json!({"version": "1.0.0", "story_id": "", "visited_passages": []}),
                &SaveMigrator::with_builtin(),
            )
            .expect_err("invalid");
        assert_eq!(error.code, codes::SAVE_VALIDATION);

        let after = state.serialize();
        assert_eq!(before.variables, after.variables);
        assert_eq!(before.visited_passages, after.visited_passages);
        assert!(state.can_undo());
    }

    #[test]
    fn transients_are_not_saved() {
        let mut state = NarrativeState::with_seed("tale", StateLimits::default(), 5);
        state.set_temp("scratch", Value::from(1i64)).expect("temp");
        state
            .declare_collection("keys", Collection::list(["a"]))
            .expect("list");
        let document = state.serialize();
        assert!(!document.variables.contains_key("scratch"));
        assert!(document.collections.contains_key("keys"));
    }
}
