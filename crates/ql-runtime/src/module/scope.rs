use std::collections::BTreeMap;

use ql_core::Value;

/// Parameter scopes of the active calls. Inner frames shadow outer ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeChain {
    frames: Vec<BTreeMap<String, Value>>,
}

impl ScopeChain {
    pub fn push(&mut self, frame: BTreeMap<String, Value>) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<BTreeMap<String, Value>> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Every visible binding, outermost first, one entry per name.
    pub fn visible(&self) -> Vec<(String, Value)> {
        let mut merged: BTreeMap<&str, &Value> = BTreeMap::new();
        for frame in &self.frames {
            for (name, value) in frame {
                merged.insert(name, value);
            }
        }
        merged
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }
}
