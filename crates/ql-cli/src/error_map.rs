use std::fmt::Display;

use ql_core::{codes, QuillError};

fn map_error(code: &'static str, error: impl Display) -> QuillError {
    QuillError::new(code, error.to_string())
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

pub(crate) fn emit_error(error: QuillError) -> i32 {
    tracing::debug!(code = %error.code, "command failed");
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    if let Some(suggestion) = &error.suggestion {
        println!("ERROR_HINT_JSON:{}", json_string(suggestion));
    }
    if let Some(detail) = &error.detail {
        if let Ok(detail) = serde_json::to_string(detail) {
            println!("ERROR_DETAIL_JSON:{}", detail);
        }
    }
    1
}

pub(crate) fn map_config_read(error: std::io::Error) -> QuillError {
    map_error(codes::CONFIG_READ, error)
}

pub(crate) fn map_story_read(error: std::io::Error) -> QuillError {
    map_error(codes::CLI_STORY_READ, error)
}

pub(crate) fn map_state_read(error: std::io::Error) -> QuillError {
    map_error(codes::CLI_STATE_READ, error)
}

pub(crate) fn map_state_write(error: std::io::Error) -> QuillError {
    map_error(codes::CLI_STATE_WRITE, error)
}

pub(crate) fn map_state_invalid(error: serde_json::Error) -> QuillError {
    map_error(codes::CLI_STATE_INVALID, error)
}

pub(crate) fn map_source_scan(error: walkdir::Error) -> QuillError {
    map_error(codes::CLI_SOURCE_SCAN, error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(QuillError::new("ERR", "failed").suggest("try again"));
        assert_eq!(code, 1);
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(
            map_config_read(std::io::Error::other("config")).code,
            codes::CONFIG_READ
        );
        assert_eq!(
            map_story_read(std::io::Error::other("story")).code,
            codes::CLI_STORY_READ
        );
        assert_eq!(
            map_state_read(std::io::Error::other("read")).code,
            codes::CLI_STATE_READ
        );
        assert_eq!(
            map_state_write(std::io::Error::other("write")).code,
            codes::CLI_STATE_WRITE
        );
        let invalid = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        assert_eq!(map_state_invalid(invalid).code, codes::CLI_STATE_INVALID);
    }

    #[test]
    fn json_string_escapes_quotes() {
        assert_eq!(json_string("say \"hi\""), r#""say \"hi\"""#);
    }
}
