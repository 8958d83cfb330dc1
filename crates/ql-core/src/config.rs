use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codes;
use crate::error::QuillError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuillConfig {
    pub sandbox: SandboxLimits,
    pub state: StateLimits,
    pub modules: ModuleLimits,
}

/// Limits applied to every sandboxed evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SandboxLimits {
    /// Turns on weighted instruction and wall-clock accounting.
    pub enabled: bool,
    pub max_instructions: u64,
    pub timeout_ms: u64,
    /// Operations between two budget checkpoints.
    pub checkpoint_interval: u64,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    pub max_call_levels: usize,
    /// Roll back state mutations made by a failed evaluation.
    pub transactional: bool,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            max_instructions: 1_000_000,
            timeout_ms: 1_000,
            checkpoint_interval: 1_000,
            max_string_size: 1 << 20,
            max_array_size: 100_000,
            max_map_size: 100_000,
            max_call_levels: 64,
            transactional: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateLimits {
    pub max_history: usize,
    pub max_tunnel_depth: usize,
}

impl Default for StateLimits {
    fn default() -> Self {
        Self {
            max_history: 100,
            max_tunnel_depth: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModuleLimits {
    pub max_recursion_depth: usize,
    pub max_include_depth: usize,
    /// Frames shown in a recursion trace.
    pub trace_frames: usize,
    /// Characters of each argument shown in a recursion trace.
    pub arg_display_len: usize,
    pub project_root: PathBuf,
    pub search_paths: Vec<PathBuf>,
    pub extension: String,
}

impl Default for ModuleLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 50,
            max_include_depth: 32,
            trace_frames: 5,
            arg_display_len: 24,
            project_root: PathBuf::from("."),
            search_paths: Vec::new(),
            extension: "ql".to_string(),
        }
    }
}

impl QuillConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, QuillError> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            QuillError::new(codes::CONFIG_INVALID, format!("Invalid config: {}", error))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), QuillError> {
        let mut problems = Vec::new();
        if self.sandbox.checkpoint_interval == 0 {
            problems.push("sandbox.checkpointInterval must be positive");
        }
        if self.state.max_tunnel_depth == 0 {
            problems.push("state.maxTunnelDepth must be positive");
        }
        if self.modules.max_recursion_depth == 0 {
            problems.push("modules.maxRecursionDepth must be positive");
        }
        if self.modules.extension.is_empty() || self.modules.extension.contains('.') {
            problems.push("modules.extension must be a bare extension such as \"ql\"");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(QuillError::new(codes::CONFIG_INVALID, problems.join("; ")))
        }
    }
}
