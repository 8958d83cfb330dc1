//! Stable error codes. Callers and tests match on these, never on message text.

pub const SCRIPT_COMPILE: &str = "SCRIPT_COMPILE";
pub const SCRIPT_RUNTIME: &str = "SCRIPT_RUNTIME";
pub const SCRIPT_RESOURCE_LIMIT: &str = "SCRIPT_RESOURCE_LIMIT";
pub const SCRIPT_VALUE_UNSUPPORTED: &str = "SCRIPT_VALUE_UNSUPPORTED";
pub const SANDBOX_NOT_PERMITTED: &str = "SANDBOX_NOT_PERMITTED";

pub const RECURSION_LIMIT: &str = "RECURSION_LIMIT";
pub const TUNNEL_OVERFLOW: &str = "TUNNEL_OVERFLOW";
pub const TUNNEL_UNDERFLOW: &str = "TUNNEL_UNDERFLOW";

pub const INCLUDE_CIRCULAR: &str = "INCLUDE_CIRCULAR";
pub const INCLUDE_NOT_FOUND: &str = "INCLUDE_NOT_FOUND";
pub const INCLUDE_PARSE_ERROR: &str = "INCLUDE_PARSE_ERROR";
pub const INCLUDE_DEPTH_EXCEEDED: &str = "INCLUDE_DEPTH_EXCEEDED";
pub const INCLUDE_READ: &str = "INCLUDE_READ";

pub const SAVE_VALIDATION: &str = "SAVE_VALIDATION";
pub const SAVE_MIGRATION: &str = "SAVE_MIGRATION";
pub const SAVE_VERSION: &str = "SAVE_VERSION";
pub const SAVE_DECODE: &str = "SAVE_DECODE";

pub const STATE_RESERVED_NAME: &str = "STATE_RESERVED_NAME";
pub const STATE_TEMP_SHADOWS_VARIABLE: &str = "STATE_TEMP_SHADOWS_VARIABLE";
pub const STATE_COLLECTION_NOT_FOUND: &str = "STATE_COLLECTION_NOT_FOUND";
pub const STATE_COLLECTION_KIND: &str = "STATE_COLLECTION_KIND";
pub const STATE_COLLECTION_EXISTS: &str = "STATE_COLLECTION_EXISTS";
pub const STATE_VALUE_OUT_OF_DOMAIN: &str = "STATE_VALUE_OUT_OF_DOMAIN";
pub const STATE_INDEX_OUT_OF_RANGE: &str = "STATE_INDEX_OUT_OF_RANGE";
pub const STATE_NOTHING_TO_UNDO: &str = "STATE_NOTHING_TO_UNDO";
pub const STATE_RANDOM_ARGUMENT: &str = "STATE_RANDOM_ARGUMENT";

pub const MODULE_FUNCTION_NOT_FOUND: &str = "MODULE_FUNCTION_NOT_FOUND";
pub const MODULE_NAMESPACE_UNDERFLOW: &str = "MODULE_NAMESPACE_UNDERFLOW";
pub const MODULE_INVALID_NAME: &str = "MODULE_INVALID_NAME";
pub const MODULE_ARGUMENT_COUNT: &str = "MODULE_ARGUMENT_COUNT";

pub const STORY_PASSAGE_NOT_FOUND: &str = "STORY_PASSAGE_NOT_FOUND";
pub const STORY_CHOICE_NOT_FOUND: &str = "STORY_CHOICE_NOT_FOUND";
pub const STORY_CHOICE_UNAVAILABLE: &str = "STORY_CHOICE_UNAVAILABLE";
pub const STORY_INVALID: &str = "STORY_INVALID";
pub const STORY_NOT_STARTED: &str = "STORY_NOT_STARTED";

pub const CONFIG_READ: &str = "CONFIG_READ";
pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

pub const CLI_STORY_READ: &str = "CLI_STORY_READ";
pub const CLI_STATE_NOT_FOUND: &str = "CLI_STATE_NOT_FOUND";
pub const CLI_STATE_READ: &str = "CLI_STATE_READ";
pub const CLI_STATE_WRITE: &str = "CLI_STATE_WRITE";
pub const CLI_STATE_INVALID: &str = "CLI_STATE_INVALID";
pub const CLI_SOURCE_SCAN: &str = "CLI_SOURCE_SCAN";
