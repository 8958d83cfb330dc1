use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use ql_core::{codes, Collection, QuillError, Value};
use ql_state::RESERVED_PREFIX;

/// Read-only story data handed to a session. Authoring tools own the real
/// schema; this is the subset the runtime consumes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoryRecord {
    pub id: String,
    pub start: String,
    /// Persistent variables set when a play-through starts.
    pub variables: BTreeMap<String, Value>,
    pub passages: Vec<PassageRecord>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PassageRecord {
    pub id: String,
    pub content: String,
    /// List domains, declared on first entry.
    pub lists: BTreeMap<String, Vec<String>>,
    pub arrays: BTreeMap<String, Vec<Value>>,
    pub maps: BTreeMap<String, BTreeMap<String, Value>>,
    pub choices: Vec<ChoiceRecord>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChoiceRecord {
    pub id: String,
    pub text: String,
    pub target: Option<String>,
    pub condition: Option<String>,
    pub action: Option<String>,
    /// Hidden for good once picked.
    pub once: bool,
    pub divert: Divert,
}

/// How a choice leaves its passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Divert {
    #[default]
    Goto,
    /// Remember the current passage, then go to the target.
    Tunnel,
    /// Go back to the passage that opened the innermost tunnel.
    Return,
}

impl StoryRecord {
    pub fn from_json_str(raw: &str) -> Result<Self, QuillError> {
        let story: Self = serde_json::from_str(raw).map_err(|error| {
            QuillError::new(codes::STORY_INVALID, format!("Invalid story: {}", error))
        })?;
        story.validate()?;
        Ok(story)
    }

    pub fn passage(&self, id: &str) -> Option<&PassageRecord> {
        self.passages.iter().find(|passage| passage.id == id)
    }

    /// Structural checks: unique ids, a known start passage, known targets.
    pub fn validate(&self) -> Result<(), QuillError> {
        let mut problems = Vec::new();
        let mut passage_ids = BTreeSet::new();
        for passage in &self.passages {
            if !passage_ids.insert(passage.id.as_str()) {
                problems.push(format!("duplicate passage \"{}\"", passage.id));
            }
        }
        if self.passage(&self.start).is_none() {
            problems.push(format!("start passage \"{}\" does not exist", self.start));
        }
        for passage in &self.passages {
            for (name, _) in passage.initializers() {
                if name.is_empty() || name.starts_with(RESERVED_PREFIX) {
                    problems.push(format!(
                        "passage \"{}\" declares unusable collection name \"{}\"",
                        passage.id, name
                    ));
                }
            }
            let mut choice_ids = BTreeSet::new();
            for choice in &passage.choices {
                if !choice_ids.insert(choice.id.as_str()) {
                    problems.push(format!(
                        "duplicate choice \"{}\" in passage \"{}\"",
                        choice.id, passage.id
                    ));
                }
                match (&choice.divert, &choice.target) {
                    (Divert::Return, _) => {}
                    (_, Some(target)) if !passage_ids.contains(target.as_str()) => {
                        problems.push(format!(
                            "choice \"{}\" in passage \"{}\" targets unknown passage \"{}\"",
                            choice.id, passage.id, target
                        ));
                    }
                    (Divert::Tunnel, None) => problems.push(format!(
                        "tunnel choice \"{}\" in passage \"{}\" has no target",
                        choice.id, passage.id
                    )),
                    _ => {}
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(QuillError::new(codes::STORY_INVALID, problems.join("; ")))
        }
    }
}

impl PassageRecord {
    pub fn choice(&self, id: &str) -> Option<(usize, &ChoiceRecord)> {
        self.choices
            .iter()
            .enumerate()
            .find(|(_, choice)| choice.id == id)
    }

    /// Collections this passage declares, in declaration-kind order.
    pub fn initializers(&self) -> Vec<(String, Collection)> {
        let lists = self
            .lists
            .iter()
            .map(|(name, domain)| (name.clone(), Collection::list(domain.iter().cloned())));
        let arrays = self
            .arrays
            .iter()
            .map(|(name, items)| (name.clone(), Collection::array(items.clone())));
        let maps = self
            .maps
            .iter()
            .map(|(name, entries)| (name.clone(), Collection::map(entries.clone())));
        lists.chain(arrays).chain(maps).collect()
    }
}
