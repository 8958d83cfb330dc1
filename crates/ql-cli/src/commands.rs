use std::path::{Path, PathBuf};

use ql_api::{
    create_session, resume_session, CreateSessionOptions, ResumeSessionOptions, Session,
};
use ql_core::{QuillConfig, QuillError};
use ql_loader::{FsSource, PathResolver};
use ql_runtime::ModuleRuntime;
use ql_save::{validate, SaveMigrator};
use walkdir::WalkDir;

use crate::{
    json_string, load_save, load_story, map_source_scan, write_save, CheckArgs, EvalArgs,
    MigrateArgs, RenderArgs, SessionArgs,
};

const STORY_SUFFIX: &str = ".story.json";

pub(crate) fn open_session(
    args: &SessionArgs,
    config: &QuillConfig,
) -> Result<Session, QuillError> {
    let story = load_story(Path::new(&args.story))?;
    let mut config = config.clone();
    if let Some(dir) = &args.modules_dir {
        config.modules.project_root = PathBuf::from(dir);
    }
    match &args.state_in {
        Some(state_in) => resume_session(ResumeSessionOptions {
            story,
            config,
            modules: None,
            includes: args.include.clone(),
            save: load_save(Path::new(state_in))?,
        }),
        None => create_session(CreateSessionOptions {
            story,
            config,
            modules: None,
            includes: args.include.clone(),
            random_seed: args.seed,
        }),
    }
}

pub(crate) fn run_eval(args: EvalArgs, config: &QuillConfig) -> Result<i32, QuillError> {
    let mut session = open_session(&args.session, config)?;
    let value = if args.exec {
        session.execute(&args.expr)?
    } else {
        session.evaluate(&args.expr)?
    };
    let state_out = save_if_requested(&session, args.state_out)?;

    println!("RESULT:OK");
    println!(
        "VALUE_JSON:{}",
        serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
    );
    println!("STATE_OUT:{}", state_out.unwrap_or_else(|| "NONE".to_string()));
    Ok(0)
}

pub(crate) fn run_render(args: RenderArgs, config: &QuillConfig) -> Result<i32, QuillError> {
    let mut session = open_session(&args.session, config)?;
    if let Some(choice) = &args.choice {
        session.select_choice(choice)?;
    }
    let text = session.render_current()?;
    let choices = session.available_choices()?;
    let passage = session.current_passage()?.id.clone();
    let state_out = save_if_requested(&session, args.state_out)?;

    println!("RESULT:OK");
    println!("PASSAGE:{}", passage);
    println!("TEXT_JSON:{}", json_string(&text));
    for choice in choices {
        println!("CHOICE:{}|{}", choice.id, json_string(&choice.text));
    }
    println!("STATE_OUT:{}", state_out.unwrap_or_else(|| "NONE".to_string()));
    Ok(0)
}

pub(crate) fn run_migrate(args: MigrateArgs) -> Result<i32, QuillError> {
    let document = load_save(Path::new(&args.state_in))?;
    let migrator = SaveMigrator::with_builtin();
    let from = SaveMigrator::document_version(&document)?;
    let document = if migrator.needs_migration(&document)? {
        migrator.migrate(document)?
    } else {
        document
    };
    validate(&document)?;
    write_save(Path::new(&args.state_out), &document)?;

    println!("RESULT:OK");
    println!("FROM_VERSION:{}", from);
    println!("TO_VERSION:{}", migrator.current_version());
    println!("STATE_OUT:{}", args.state_out);
    Ok(0)
}

/// Loads every module under the directory through one runtime, so include
/// cycles and parse errors surface, then validates every story file.
pub(crate) fn run_check(args: CheckArgs, config: &QuillConfig) -> Result<i32, QuillError> {
    let root = PathResolver::normalize(Path::new(&args.dir));
    let mut limits = config.modules.clone();
    limits.project_root = root.clone();
    let extension = limits.extension.clone();
    let modules = ModuleRuntime::with_filesystem(limits);

    let mut reports = Vec::new();
    for path in FsSource::list_modules(&root, &extension)? {
        let reference = match path.strip_prefix(&root) {
            Ok(relative) => relative.to_string_lossy().into_owned(),
            Err(_) => path.to_string_lossy().into_owned(),
        };
        let record = modules.load_include(&reference, None, None)?;
        reports.push(format!("MODULE:{}|{}", reference, record.functions.len()));
    }

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(map_source_scan)?;
        let path = entry.path();
        let is_story = entry.file_type().is_file()
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(STORY_SUFFIX));
        if !is_story {
            continue;
        }
        let story = load_story(path)?;
        reports.push(format!("STORY:{}|{}", story.id, story.passages.len()));
    }

    println!("RESULT:OK");
    for report in reports {
        println!("{}", report);
    }
    println!("FUNCTIONS:{}", modules.function_names().len());
    Ok(0)
}

fn save_if_requested(
    session: &Session,
    state_out: Option<String>,
) -> Result<Option<String>, QuillError> {
    let Some(state_out) = state_out else {
        return Ok(None);
    };
    write_save(Path::new(&state_out), &session.save()?)?;
    Ok(Some(state_out))
}
