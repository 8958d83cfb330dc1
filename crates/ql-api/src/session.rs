use std::fmt;
use std::rc::Rc;

use serde_json::Value as JsonValue;

use ql_core::{codes, QuillConfig, QuillError, Value};
use ql_runtime::{ControlFlowProcessor, IncludeRecord, Interpreter, ModuleRuntime, ScriptContext};
use ql_save::SaveMigrator;
use ql_state::{NarrativeState, TunnelFrame};

use crate::story::{ChoiceRecord, Divert, PassageRecord, StoryRecord};

/// A choice as offered to the player, with its text already interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceView {
    pub id: String,
    pub text: String,
}

/// One play-through of a story. Owns its state, interpreter and module
/// runtime; nothing here is shared across sessions.
pub struct Session {
    story: StoryRecord,
    state: NarrativeState,
    processor: ControlFlowProcessor,
    modules: ModuleRuntime,
    migrator: SaveMigrator,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("story", &self.story.id)
            .field("passage", &self.state.current_passage())
            .field("modules", &self.modules)
            .finish()
    }
}

impl Session {
    pub fn new(
        story: StoryRecord,
        config: &QuillConfig,
        modules: ModuleRuntime,
        random_seed: Option<u32>,
    ) -> Self {
        let state = match random_seed {
            Some(seed) => NarrativeState::with_seed(story.id.as_str(), config.state.clone(), seed),
            None => NarrativeState::new(story.id.as_str(), config.state.clone()),
        };
        Self {
            story,
            state,
            processor: ControlFlowProcessor::new(Interpreter::new(config.sandbox.clone())),
            modules,
            migrator: SaveMigrator::with_builtin(),
        }
    }

    pub fn story(&self) -> &StoryRecord {
        &self.story
    }

    pub fn state(&self) -> &NarrativeState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut NarrativeState {
        &mut self.state
    }

    pub fn modules(&self) -> &ModuleRuntime {
        &self.modules
    }

    pub fn migrator_mut(&mut self) -> &mut SaveMigrator {
        &mut self.migrator
    }

    /// Applies the story's variable defaults and enters the start passage.
    pub fn start(&mut self) -> Result<(), QuillError> {
        for (name, value) in &self.story.variables {
            self.state.set_variable(name, value.clone())?;
        }
        let start = self.story.start.clone();
        tracing::debug!(story = %self.story.id, start = %start, "session started");
        self.enter_passage(&start)
    }

    /// Moves to `id` and declares its collections. Either both happen or
    /// the state is left as it was.
    pub fn enter_passage(&mut self, id: &str) -> Result<(), QuillError> {
        let initializers = self
            .story
            .passage(id)
            .ok_or_else(|| {
                QuillError::new(
                    codes::STORY_PASSAGE_NOT_FOUND,
                    format!("Passage \"{}\" does not exist.", id),
                )
            })?
            .initializers();
        let checkpoint = self.state.checkpoint();
        self.state.set_current_passage(id);
        for (name, collection) in initializers {
            if self.state.has_collection(&name) {
                continue;
            }
            if let Err(error) = self.state.declare_collection(&name, collection) {
                self.state.rollback(checkpoint);
                return Err(error);
            }
        }
        Ok(())
    }

    pub fn current_passage(&self) -> Result<&PassageRecord, QuillError> {
        let id = self.state.current_passage().ok_or_else(|| {
            QuillError::new(codes::STORY_NOT_STARTED, "No passage has been entered yet.")
        })?;
        self.story.passage(id).ok_or_else(|| {
            QuillError::new(
                codes::STORY_PASSAGE_NOT_FOUND,
                format!("Passage \"{}\" does not exist.", id),
            )
        })
    }

    /// Runs the current passage's content through the control-flow
    /// processor and interpolation.
    pub fn render_current(&mut self) -> Result<String, QuillError> {
        let content = self.current_passage()?.content.clone();
        let ctx = self.context();
        self.processor.render(&content, &mut self.state, &ctx)
    }

    /// Choices whose condition holds and that were not already used up.
    pub fn available_choices(&mut self) -> Result<Vec<ChoiceView>, QuillError> {
        let choices = self.current_passage()?.choices.clone();
        let ctx = self.context();
        let mut offered = Vec::new();
        for choice in &choices {
            if !self.is_available(choice, &ctx)? {
                continue;
            }
            let text = self
                .processor
                .interpolate(&choice.text, &mut self.state, &ctx)?;
            offered.push(ChoiceView {
                id: choice.id.clone(),
                text,
            });
        }
        Ok(offered)
    }

    /// Runs the choice's action, then follows its divert. If either step
    /// fails the session is left where it was.
    pub fn select_choice(&mut self, choice_id: &str) -> Result<(), QuillError> {
        let passage = self.current_passage()?;
        let passage_id = passage.id.clone();
        let (position, choice) = passage
            .choice(choice_id)
            .map(|(position, choice)| (position, choice.clone()))
            .ok_or_else(|| {
                QuillError::new(
                    codes::STORY_CHOICE_NOT_FOUND,
                    format!("Passage \"{}\" has no choice \"{}\".", passage_id, choice_id),
                )
            })?;
        let ctx = self.context();
        if !self.is_available(&choice, &ctx)? {
            return Err(QuillError::new(
                codes::STORY_CHOICE_UNAVAILABLE,
                format!("Choice \"{}\" is not available right now.", choice_id),
            ));
        }

        let checkpoint = self.state.checkpoint();
        let outcome = self.follow_choice(&passage_id, position, choice, &ctx);
        if outcome.is_err() {
            self.state.rollback(checkpoint);
        }
        outcome
    }

    fn follow_choice(
        &mut self,
        passage_id: &str,
        position: usize,
        choice: ChoiceRecord,
        ctx: &ScriptContext,
    ) -> Result<(), QuillError> {
        if let Some(action) = choice.action.as_deref().filter(|code| !code.trim().is_empty()) {
            self.processor
                .interpreter()
                .execute_code(action, &mut self.state, ctx)?;
        }
        if choice.once {
            self.state.mark_choice_selected(&choice.id);
        }
        tracing::debug!(passage = %passage_id, choice = %choice.id, "choice selected");

        match (choice.divert, choice.target) {
            (Divert::Return, _) => {
                let frame = self.state.pop_tunnel()?;
                self.enter_passage(&frame.return_passage)
            }
            (Divert::Tunnel, Some(target)) => {
                self.state
                    .push_tunnel(TunnelFrame::new(passage_id, position))?;
                self.enter_passage(&target)
            }
            (_, Some(target)) => self.enter_passage(&target),
            (_, None) => Ok(()),
        }
    }

    pub fn evaluate(&mut self, expression: &str) -> Result<Value, QuillError> {
        let ctx = self.context();
        self.processor
            .interpreter()
            .evaluate_expression(expression, &mut self.state, &ctx)
    }

    pub fn execute(&mut self, code: &str) -> Result<Value, QuillError> {
        let ctx = self.context();
        self.processor
            .interpreter()
            .execute_code(code, &mut self.state, &ctx)
    }

    pub fn undo(&mut self) -> Result<(), QuillError> {
        self.state.undo()
    }

    pub fn save(&self) -> Result<JsonValue, QuillError> {
        self.state.serialize_json()
    }

    /// Restores a save made for this story. Older formats are migrated
    /// first; on any error the session is unchanged.
    pub fn load(&mut self, document: JsonValue) -> Result<(), QuillError> {
        let mut restored = self.state.clone();
        restored.deserialize(document, &self.migrator)?;
        if restored.story_id() != self.story.id {
            return Err(QuillError::new(
                codes::SAVE_VALIDATION,
                format!(
                    "Save belongs to story \"{}\", not \"{}\".",
                    restored.story_id(),
                    self.story.id
                ),
            ));
        }
        if let Some(passage) = restored.current_passage() {
            if self.story.passage(passage).is_none() {
                return Err(QuillError::new(
                    codes::STORY_PASSAGE_NOT_FOUND,
                    format!("Saved passage \"{}\" does not exist.", passage),
                ));
            }
        }
        self.state = restored;
        Ok(())
    }

    pub fn load_include(&mut self, reference: &str) -> Result<IncludeRecord, QuillError> {
        self.modules.load_include(reference, None, None)
    }

    fn context(&self) -> ScriptContext {
        let ctx = ScriptContext::new().with_host(Rc::new(self.modules.clone()));
        match self.state.current_passage() {
            Some(passage) => ctx.with_source(passage),
            None => ctx,
        }
    }

    fn is_available(&mut self, choice: &ChoiceRecord, ctx: &ScriptContext) -> Result<bool, QuillError> {
        if choice.once && self.state.is_choice_selected(&choice.id) {
            return Ok(false);
        }
        let Some(condition) = choice.condition.as_deref() else {
            return Ok(true);
        };
        match self
            .processor
            .interpreter()
            .evaluate_condition(condition, &mut self.state, ctx)
        {
            Ok(holds) => Ok(holds),
            Err(error) if error.is_abort() => Err(error),
            Err(error) => {
                tracing::warn!(choice = %choice.id, %error, "choice condition failed; hiding choice");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod session_tests {
    use std::path::PathBuf;

    use ql_core::ModuleLimits;
    use ql_loader::MemorySource;

    use super::*;

    fn choice(id: &str, target: Option<&str>) -> ChoiceRecord {
        ChoiceRecord {
            id: id.to_string(),
            text: id.to_string(),
            target: target.map(str::to_string),
            ..ChoiceRecord::default()
        }
    }

    fn passage(id: &str, content: &str, choices: Vec<ChoiceRecord>) -> PassageRecord {
        PassageRecord {
            id: id.to_string(),
            content: content.to_string(),
            choices,
            ..PassageRecord::default()
        }
    }

    fn session(story: StoryRecord) -> Session {
        let modules = ModuleRuntime::in_memory(
            ModuleLimits {
                project_root: PathBuf::from("/s"),
                ..ModuleLimits::default()
            },
            MemorySource::new(),
        );
        Session::new(story, &QuillConfig::default(), modules, Some(3))
    }

    fn two_rooms() -> StoryRecord {
        StoryRecord {
            id: "rooms".to_string(),
            start: "a".to_string(),
            variables: [("keys".to_string(), Value::from(0i64))].into_iter().collect(),
            passages: vec![
                passage("a", "Room A", vec![choice("to-b", Some("b"))]),
                passage("b", "Room B", vec![choice("to-a", Some("a"))]),
            ],
        }
    }

    #[test]
    fn operations_before_start_report_not_started() {
        let mut session = session(two_rooms());
        let error = session.render_current().expect_err("not started");
        assert_eq!(error.code, codes::STORY_NOT_STARTED);
    }

    #[test]
    fn unknown_passages_and_choices_are_rejected() {
        let mut session = session(two_rooms());
        session.start().expect("start");
        let error = session.enter_passage("attic").expect_err("missing");
        assert_eq!(error.code, codes::STORY_PASSAGE_NOT_FOUND);
        assert_eq!(session.state().current_passage(), Some("a"));

        let error = session.select_choice("fly").expect_err("no choice");
        assert_eq!(error.code, codes::STORY_CHOICE_NOT_FOUND);
    }

    #[test]
    fn failed_passage_entry_leaves_no_trace() {
        let mut story = two_rooms();
        story.passages[1]
            .lists
            .insert("__secret".to_string(), vec!["x".to_string()]);
        let mut session = session(story);
        session.start().expect("start");
        let history = session.state().history_len();

        let error = session.select_choice("to-b").expect_err("reserved list");
        assert_eq!(error.code, codes::STATE_RESERVED_NAME);
        assert_eq!(session.state().current_passage(), Some("a"));
        assert_eq!(session.state().history_len(), history);

        let error = session.enter_passage("b").expect_err("reserved list");
        assert_eq!(error.code, codes::STATE_RESERVED_NAME);
        assert_eq!(session.state().current_passage(), Some("a"));
        assert_eq!(session.state().visit_count("b"), 0);
        assert_eq!(session.state().history_len(), history);
    }

    #[test]
    fn failed_load_leaves_the_session_alone() {
        let mut session = session(two_rooms());
        session.start().expect("start");
        session.select_choice("to-b").expect("to b");
        let mut other = self::session(StoryRecord {
            id: "elsewhere".to_string(),
            ..two_rooms()
        });
        other.start().expect("start");
        let foreign = other.save().expect("save");

        let error = session.load(foreign).expect_err("wrong story");
        assert_eq!(error.code, codes::SAVE_VALIDATION);
        assert_eq!(session.state().current_passage(), Some("b"));
    }
}
