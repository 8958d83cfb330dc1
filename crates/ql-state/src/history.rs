use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ql_core::{Collection, Value};

use crate::rng::RandomState;
use crate::tunnel::TunnelFrame;

/// State captured right before a passage transition.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub current_passage: Option<String>,
    pub variables: BTreeMap<String, Value>,
    pub visited: BTreeMap<String, u32>,
    pub collections: BTreeMap<String, Collection>,
    pub tunnel: Vec<TunnelFrame>,
    pub selected_choices: BTreeSet<String>,
}

/// Everything a failed evaluation may have touched. Restored as a whole so a
/// rolled-back script leaves no trace, random draws included.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub(crate) snapshot: HistorySnapshot,
    pub(crate) temps: BTreeMap<String, Value>,
    pub(crate) rng: RandomState,
    pub(crate) history: HistoryMark,
}

/// Where the history stood at a checkpoint. A full history also keeps the
/// entry the next push would evict, so one transition can be taken back
/// exactly.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HistoryMark {
    pushes: u64,
    evictable: Option<HistorySnapshot>,
}

/// Bounded FIFO of snapshots; the oldest entry is evicted first.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    entries: VecDeque<HistorySnapshot>,
    max: usize,
    pushes: u64,
}

impl History {
    pub fn new(max: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max.min(64)),
            max,
            pushes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn push(&mut self, snapshot: HistorySnapshot) {
        if self.max == 0 {
            return;
        }
        while self.entries.len() >= self.max {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
        self.pushes += 1;
    }

    pub fn pop(&mut self) -> Option<HistorySnapshot> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn mark(&self) -> HistoryMark {
        let full = self.max > 0 && self.entries.len() >= self.max;
        HistoryMark {
            pushes: self.pushes,
            evictable: full.then(|| self.entries.front().cloned()).flatten(),
        }
    }

    /// Drops entries pushed since `mark` and puts back the one entry a
    /// full history evicted for them.
    pub(crate) fn rewind(&mut self, mark: HistoryMark) {
        let since = self.pushes.saturating_sub(mark.pushes);
        if since == 0 {
            return;
        }
        for _ in 0..since {
            if self.entries.pop_back().is_none() {
                break;
            }
        }
        if let Some(evicted) = mark.evictable {
            self.entries.push_front(evicted);
        }
        self.pushes = mark.pushes;
    }
}

#[cfg(test)]
mod history_tests {
    use super::*;

    fn snapshot(passage: &str) -> HistorySnapshot {
        HistorySnapshot {
            current_passage: Some(passage.to_string()),
            variables: BTreeMap::new(),
            visited: BTreeMap::new(),
            collections: BTreeMap::new(),
            tunnel: Vec::new(),
            selected_choices: BTreeSet::new(),
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = History::new(2);
        history.push(snapshot("a"));
        history.push(snapshot("b"));
        history.push(snapshot("c"));
        assert_eq!(history.len(), 2);
        assert_eq!(
            history.pop().and_then(|s| s.current_passage).as_deref(),
            Some("c")
        );
        assert_eq!(
            history.pop().and_then(|s| s.current_passage).as_deref(),
            Some("b")
        );
        assert!(history.pop().is_none());
    }

    #[test]
    fn rewind_restores_the_evicted_entry() {
        let mut history = History::new(2);
        history.push(snapshot("a"));
        history.push(snapshot("b"));
        let mark = history.mark();
        history.push(snapshot("c"));
        history.rewind(mark);

        assert_eq!(history.len(), 2);
        assert_eq!(
            history.pop().and_then(|s| s.current_passage).as_deref(),
            Some("b")
        );
        assert_eq!(
            history.pop().and_then(|s| s.current_passage).as_deref(),
            Some("a")
        );
    }

    #[test]
    fn rewind_without_pushes_is_a_no_op() {
        let mut history = History::new(3);
        history.push(snapshot("a"));
        let mark = history.mark();
        history.rewind(mark);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut history = History::new(0);
        history.push(snapshot("a"));
        assert!(history.is_empty());
    }
}
