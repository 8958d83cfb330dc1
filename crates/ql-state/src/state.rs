use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use ql_core::{codes, Collection, QuillError, StateLimits, Value};

use crate::history::{Checkpoint, History, HistorySnapshot};
use crate::rng::RandomState;
use crate::tunnel::{TunnelFrame, TunnelStack};

/// Names with this prefix are engine bookkeeping and cannot be set by authors.
pub const RESERVED_PREFIX: &str = "__";
/// Reserved variable prefix holding text-alternative counters.
pub const ALTERNATIVE_PREFIX: &str = "__alt:";

/// All mutable data of one play-through. One instance per session.
#[derive(Debug, Clone)]
pub struct NarrativeState {
    pub(crate) story_id: String,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) variables: BTreeMap<String, Value>,
    pub(crate) temps: BTreeMap<String, Value>,
    pub(crate) collections: BTreeMap<String, Collection>,
    pub(crate) current_passage: Option<String>,
    pub(crate) visited: BTreeMap<String, u32>,
    pub(crate) selected_choices: BTreeSet<String>,
    pub(crate) tunnel: TunnelStack,
    pub(crate) history: History,
    pub(crate) rng: RandomState,
}

impl Default for NarrativeState {
    fn default() -> Self {
        Self::with_seed("", StateLimits::default(), 1)
    }
}

impl NarrativeState {
    /// New play-through seeded from the story identity and start time.
    pub fn new(story_id: impl Into<String>, limits: StateLimits) -> Self {
        let story_id = story_id.into();
        let started_at = Utc::now();
        let rng = if story_id.is_empty() {
            RandomState::from_clock()
        } else {
            RandomState::from_story(&story_id, started_at)
        };
        Self::build(story_id, started_at, limits, rng)
    }

    pub fn with_seed(story_id: impl Into<String>, limits: StateLimits, seed: u32) -> Self {
        Self::build(
            story_id.into(),
            Utc::now(),
            limits,
            RandomState::from_seed(seed),
        )
    }

    fn build(
        story_id: String,
        started_at: DateTime<Utc>,
        limits: StateLimits,
        rng: RandomState,
    ) -> Self {
        Self {
            story_id,
            started_at,
            variables: BTreeMap::new(),
            temps: BTreeMap::new(),
            collections: BTreeMap::new(),
            current_passage: None,
            visited: BTreeMap::new(),
            selected_choices: BTreeSet::new(),
            tunnel: TunnelStack::new(limits.max_tunnel_depth),
            history: History::new(limits.max_history),
            rng,
        }
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    // Persistent variables

    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), QuillError> {
        check_author_name(name)?;
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        if name.starts_with(RESERVED_PREFIX) {
            return None;
        }
        self.variables.remove(name)
    }

    /// Author-visible persistent variables; reserved bookkeeping is skipped.
    pub fn variables(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.variables
            .iter()
            .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX))
    }

    // Transient variables

    pub fn get_temp(&self, name: &str) -> Option<&Value> {
        self.temps.get(name)
    }

    pub fn has_temp(&self, name: &str) -> bool {
        self.temps.contains_key(name)
    }

    /// Fails when a persistent variable of the same name exists.
    pub fn set_temp(&mut self, name: &str, value: Value) -> Result<(), QuillError> {
        check_author_name(name)?;
        if self.variables.contains_key(name) {
            return Err(QuillError::new(
                codes::STATE_TEMP_SHADOWS_VARIABLE,
                format!(
                    "Transient \"{}\" would shadow the persistent variable of the same name.",
                    name
                ),
            )
            .suggest("Rename the transient variable."));
        }
        self.temps.insert(name.to_string(), value);
        Ok(())
    }

    pub fn temps(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.temps.iter()
    }

    pub fn clear_temps(&mut self) {
        self.temps.clear();
    }

    // Reserved storage

    pub fn alternative_counter(&self, site: &str) -> u32 {
        self.variables
            .get(&format!("{}{}", ALTERNATIVE_PREFIX, site))
            .and_then(Value::as_number)
            .map(|count| count.max(0.0) as u32)
            .unwrap_or(0)
    }

    pub fn set_alternative_counter(&mut self, site: &str, count: u32) {
        self.variables.insert(
            format!("{}{}", ALTERNATIVE_PREFIX, site),
            Value::Number(f64::from(count)),
        );
    }

    // Passages

    pub fn current_passage(&self) -> Option<&str> {
        self.current_passage.as_deref()
    }

    pub fn visit_count(&self, passage: &str) -> u32 {
        self.visited.get(passage).copied().unwrap_or(0)
    }

    pub fn visited(&self) -> &BTreeMap<String, u32> {
        &self.visited
    }

    /// Snapshot, clear transients, move, count the visit, in that order.
    pub fn set_current_passage(&mut self, passage: &str) {
        let snapshot = self.snapshot();
        self.history.push(snapshot);
        self.temps.clear();
        self.current_passage = Some(passage.to_string());
        *self.visited.entry(passage.to_string()).or_insert(0) += 1;
        tracing::debug!(
            passage,
            visits = self.visit_count(passage),
            history = self.history.len(),
            "passage transition"
        );
    }

    pub fn mark_choice_selected(&mut self, choice_id: &str) {
        self.selected_choices.insert(choice_id.to_string());
    }

    pub fn is_choice_selected(&self, choice_id: &str) -> bool {
        self.selected_choices.contains(choice_id)
    }

    pub fn selected_choices(&self) -> impl Iterator<Item = &String> {
        self.selected_choices.iter()
    }

    // Tunnels

    pub fn push_tunnel(&mut self, frame: TunnelFrame) -> Result<(), QuillError> {
        self.tunnel.push(frame)
    }

    pub fn pop_tunnel(&mut self) -> Result<TunnelFrame, QuillError> {
        self.tunnel.pop()
    }

    pub fn peek_tunnel(&self) -> Option<&TunnelFrame> {
        self.tunnel.peek()
    }

    pub fn tunnel_depth(&self) -> usize {
        self.tunnel.depth()
    }

    pub fn tunnel(&self) -> &TunnelStack {
        &self.tunnel
    }

    // Undo

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            current_passage: self.current_passage.clone(),
            variables: self.variables.clone(),
            visited: self.visited.clone(),
            collections: self.collections.clone(),
            tunnel: self.tunnel.frames().to_vec(),
            selected_choices: self.selected_choices.clone(),
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Replaces (never merges) the tracked fields with the newest snapshot.
    pub fn undo(&mut self) -> Result<(), QuillError> {
        let snapshot = self.history.pop().ok_or_else(|| {
            QuillError::new(codes::STATE_NOTHING_TO_UNDO, "No earlier state to return to.")
        })?;
        self.restore_snapshot(snapshot);
        self.temps.clear();
        Ok(())
    }

    /// Puts a snapshot back without touching history. Used to roll back a
    /// failed evaluation.
    pub fn restore_snapshot(&mut self, snapshot: HistorySnapshot) {
        self.current_passage = snapshot.current_passage;
        self.variables = snapshot.variables;
        self.visited = snapshot.visited;
        self.collections = snapshot.collections;
        self.tunnel.replace_frames(snapshot.tunnel);
        self.selected_choices = snapshot.selected_choices;
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            snapshot: self.snapshot(),
            temps: self.temps.clone(),
            rng: self.rng,
            history: self.history.mark(),
        }
    }

    /// Restores everything [`checkpoint`](Self::checkpoint) captured,
    /// including undo entries pushed by transitions since then.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.restore_snapshot(checkpoint.snapshot);
        self.temps = checkpoint.temps;
        self.rng = checkpoint.rng;
        self.history.rewind(checkpoint.history);
    }

    // Randomness

    pub fn rng(&self) -> &RandomState {
        &self.rng
    }

    pub fn rng_mut(&mut self) -> &mut RandomState {
        &mut self.rng
    }

    pub fn reseed(&mut self, seed: u32) {
        self.rng = RandomState::from_seed(seed);
    }

    pub fn reseed_from_story(&mut self) {
        self.rng = RandomState::from_story(&self.story_id, self.started_at);
    }

    pub fn reseed_from_clock(&mut self) {
        self.rng = RandomState::from_clock();
    }

    pub fn random_range(&mut self, min: i64, max: i64) -> Result<i64, QuillError> {
        self.rng.range(min, max)
    }

    pub fn random_pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        self.rng.pick(items)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        self.rng.shuffle(items)
    }

    pub fn roll_dice(&mut self, count: u32, sides: u32) -> Result<i64, QuillError> {
        self.rng.dice(count, sides)
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.rng.chance(probability)
    }
}

fn check_author_name(name: &str) -> Result<(), QuillError> {
    if name.is_empty() || name.starts_with(RESERVED_PREFIX) {
        return Err(QuillError::new(
            codes::STATE_RESERVED_NAME,
            format!("\"{}\" is not a usable variable name.", name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod state_tests {
    use super::*;

    fn state() -> NarrativeState {
        NarrativeState::with_seed("test", StateLimits::default(), 1)
    }

    #[test]
    fn transition_clears_every_transient() {
        let mut state = state();
        state.set_temp("a", Value::from(1i64)).expect("temp");
        state.set_temp("b", Value::from("x")).expect("temp");
        state.set_current_passage("next");
        assert!(state.get_temp("a").is_none());
        assert!(state.get_temp("b").is_none());
        assert_eq!(state.visit_count("next"), 1);
        assert_eq!(state.current_passage(), Some("next"));
    }

    #[test]
    fn transient_cannot_shadow_persistent() {
        let mut state = state();
        state.set_variable("gold", Value::from(5i64)).expect("var");
        let error = state
            .set_temp("gold", Value::from(1i64))
            .expect_err("shadow");
        assert_eq!(error.code, codes::STATE_TEMP_SHADOWS_VARIABLE);

        state.set_temp("silver", Value::from(1i64)).expect("temp");
        state
            .set_variable("silver", Value::from(2i64))
            .expect("persistent may reuse a transient name");
    }

    #[test]
    fn reserved_names_are_rejected() {
        let mut state = state();
        let error = state
            .set_variable("__alt:x", Value::Nil)
            .expect_err("reserved");
        assert_eq!(error.code, codes::STATE_RESERVED_NAME);
        state.set_alternative_counter("p:3", 2);
        assert_eq!(state.alternative_counter("p:3"), 2);
        assert_eq!(state.variables().count(), 0);
    }

    #[test]
    fn snapshot_precedes_temp_clear() {
        let mut state = state();
        state.set_current_passage("a");
        state.set_variable("k", Value::from(1i64)).expect("var");
        state.set_current_passage("b");
        state.undo().expect("undo");
        assert_eq!(state.current_passage(), Some("a"));
        assert_eq!(state.get_variable("k"), Some(&Value::from(1i64)));
        assert_eq!(state.visit_count("b"), 0);
    }

    #[test]
    fn rollback_restores_temps_and_rng() {
        let mut state = state();
        state.set_temp("t", Value::from(1i64)).expect("temp");
        let checkpoint = state.checkpoint();
        let mut copy = *state.rng();
        let expected = copy.next_u32();

        state.clear_temps();
        state.set_variable("v", Value::from(true)).expect("var");
        state.rng_mut().next_u32();
        state.rollback(checkpoint);

        assert_eq!(state.get_temp("t"), Some(&Value::from(1i64)));
        assert!(!state.has_variable("v"));
        assert_eq!(state.rng_mut().next_u32(), expected);
        assert!(!state.can_undo());
    }

    #[test]
    fn rollback_drops_undo_entries_of_the_abandoned_transition() {
        let mut state = state();
        state.set_current_passage("a");
        let checkpoint = state.checkpoint();
        state.set_current_passage("b");
        assert_eq!(state.history_len(), 2);

        state.rollback(checkpoint);
        assert_eq!(state.history_len(), 1);
        assert_eq!(state.current_passage(), Some("a"));
        assert_eq!(state.visit_count("b"), 0);
        state.undo().expect("undo to start");
        assert_eq!(state.current_passage(), None);
    }

    #[test]
    fn undo_without_history_fails() {
        let mut state = state();
        assert!(!state.can_undo());
        assert_eq!(
            state.undo().expect_err("nothing").code,
            codes::STATE_NOTHING_TO_UNDO
        );
    }
}
