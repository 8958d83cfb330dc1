use std::fs;
use std::path::Path;

use serde_json::Value as JsonValue;

use ql_api::StoryRecord;
use ql_core::{codes, QuillConfig, QuillError};

use crate::{map_config_read, map_state_invalid, map_state_read, map_state_write, map_story_read};

pub(crate) fn load_config(path: Option<&str>) -> Result<QuillConfig, QuillError> {
    let Some(path) = path else {
        return Ok(QuillConfig::default());
    };
    let raw = fs::read_to_string(path).map_err(map_config_read)?;
    QuillConfig::from_json_str(&raw)
}

pub(crate) fn load_story(path: &Path) -> Result<StoryRecord, QuillError> {
    let raw = fs::read_to_string(path).map_err(map_story_read)?;
    StoryRecord::from_json_str(&raw)
}

pub(crate) fn load_save(path: &Path) -> Result<JsonValue, QuillError> {
    if !path.exists() {
        return Err(QuillError::new(
            codes::CLI_STATE_NOT_FOUND,
            format!("State file does not exist: {}", path.display()),
        ));
    }
    let raw = fs::read_to_string(path).map_err(map_state_read)?;
    serde_json::from_str(&raw).map_err(map_state_invalid)
}

pub(crate) fn write_save(path: &Path, document: &JsonValue) -> Result<(), QuillError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(map_state_write)?;
    let payload = serde_json::to_string_pretty(document).map_err(map_state_invalid)?;
    fs::write(path, payload).map_err(map_state_write)
}
