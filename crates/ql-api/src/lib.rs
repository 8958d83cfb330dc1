//! Embedding surface: story records plus a [`Session`] that wires the
//! narrative state, interpreter and module runtime together.

mod session;
mod story;

use serde_json::Value as JsonValue;

use ql_core::{QuillConfig, QuillError};
use ql_runtime::ModuleRuntime;

pub use session::{ChoiceView, Session};
pub use story::{ChoiceRecord, Divert, PassageRecord, StoryRecord};

#[derive(Debug, Clone, Default)]
pub struct CreateSessionOptions {
    pub story: StoryRecord,
    pub config: QuillConfig,
    /// Module runtime to use; files under `config.modules.project_root` when absent.
    pub modules: Option<ModuleRuntime>,
    /// Modules to include before the first passage is entered.
    pub includes: Vec<String>,
    pub random_seed: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ResumeSessionOptions {
    pub story: StoryRecord,
    pub config: QuillConfig,
    pub modules: Option<ModuleRuntime>,
    pub includes: Vec<String>,
    pub save: JsonValue,
}

pub fn create_session(options: CreateSessionOptions) -> Result<Session, QuillError> {
    let mut session = build_session(
        options.story,
        &options.config,
        options.modules,
        &options.includes,
        options.random_seed,
    )?;
    session.start()?;
    Ok(session)
}

pub fn resume_session(options: ResumeSessionOptions) -> Result<Session, QuillError> {
    let mut session = build_session(
        options.story,
        &options.config,
        options.modules,
        &options.includes,
        None,
    )?;
    session.load(options.save)?;
    Ok(session)
}

fn build_session(
    story: StoryRecord,
    config: &QuillConfig,
    modules: Option<ModuleRuntime>,
    includes: &[String],
    random_seed: Option<u32>,
) -> Result<Session, QuillError> {
    config.validate()?;
    story.validate()?;
    let modules =
        modules.unwrap_or_else(|| ModuleRuntime::with_filesystem(config.modules.clone()));
    let mut session = Session::new(story, config, modules, random_seed);
    for reference in includes {
        session.load_include(reference)?;
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ql_core::codes;

    fn story() -> StoryRecord {
        StoryRecord::from_json_str(
            r#"{"id": "tiny", "start": "only", "passages": [{"id": "only", "content": "Hi."}]}"#,
        )
        .expect("story")
    }

    #[test]
    fn create_session_enters_the_start_passage() {
        let mut session = create_session(CreateSessionOptions {
            story: story(),
            random_seed: Some(1),
            ..CreateSessionOptions::default()
        })
        .expect("session");
        assert_eq!(session.state().current_passage(), Some("only"));
        assert_eq!(session.render_current().expect("render"), "Hi.");
    }

    #[test]
    fn create_session_rejects_invalid_config() {
        let mut config = QuillConfig::default();
        config.sandbox.checkpoint_interval = 0;
        let error = create_session(CreateSessionOptions {
            story: story(),
            config,
            ..CreateSessionOptions::default()
        })
        .expect_err("invalid config");
        assert_eq!(error.code, codes::CONFIG_INVALID);
    }

    #[test]
    fn resume_session_restores_the_saved_passage() {
        let session = create_session(CreateSessionOptions {
            story: story(),
            random_seed: Some(1),
            ..CreateSessionOptions::default()
        })
        .expect("session");
        let save = session.save().expect("save");
        let resumed = resume_session(ResumeSessionOptions {
            story: story(),
            config: QuillConfig::default(),
            modules: None,
            includes: Vec::new(),
            save,
        })
        .expect("resume");
        assert_eq!(resumed.state().current_passage(), Some("only"));
        assert_eq!(resumed.state().visit_count("only"), 1);
    }
}
