use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ql_core::{codes, Collection, QuillError, Value};

pub const SAVE_FORMAT_VERSION: &str = "1.0.0";

/// Persisted play-through. Transient variables are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveDocument {
    pub version: String,
    pub story_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_passage: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub visited_passages: BTreeMap<String, u32>,
    #[serde(default)]
    pub selected_choices: Vec<String>,
    #[serde(default)]
    pub collections: BTreeMap<String, Collection>,
    #[serde(default)]
    pub tunnel_stack: Vec<TunnelRecord>,
    #[serde(default = "default_tunnel_depth_limit")]
    pub tunnel_depth_limit: usize,
    #[serde(default)]
    pub rng: RngRecord,
}

fn default_tunnel_depth_limit() -> usize {
    100
}

/// Tunnel frame as stored on disk: return target and position only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelRecord {
    pub return_passage: String,
    #[serde(default)]
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RngRecord {
    pub seed: u32,
    pub state: u32,
}

impl SaveDocument {
    pub fn to_json(&self) -> Result<serde_json::Value, QuillError> {
        serde_json::to_value(self).map_err(|error| {
            QuillError::new(
                codes::SAVE_DECODE,
                format!("Save document could not be encoded: {}", error),
            )
        })
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, QuillError> {
        serde_json::from_value(value).map_err(|error| {
            QuillError::new(
                codes::SAVE_DECODE,
                format!("Save document could not be decoded: {}", error),
            )
        })
    }
}
