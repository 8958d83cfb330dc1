use chrono::{DateTime, Utc};
use ql_core::{codes, QuillError};

/// Seeded generator shared by the state container and scripts. Every derived
/// operation consumes draws in a fixed order, so a seed plus call sequence
/// always reproduces the same results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomState {
    seed: u32,
    state: u32,
}

impl RandomState {
    pub fn from_seed(seed: u32) -> Self {
        Self { seed, state: seed }
    }

    /// Seed derived from the story identity and the play-through start time.
    pub fn from_story(story_id: &str, started_at: DateTime<Utc>) -> Self {
        let mut hash = fnv1a(story_id.as_bytes());
        for byte in started_at.timestamp_millis().to_le_bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
        Self::from_seed(hash)
    }

    pub fn from_clock() -> Self {
        let now = Utc::now();
        let nanos = now.timestamp_subsec_nanos();
        Self::from_seed((now.timestamp() as u32) ^ nanos.rotate_left(16))
    }

    pub fn restore(seed: u32, state: u32) -> Self {
        Self { seed, state }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    pub fn next_u32(&mut self) -> u32 {
        next_random_u32(&mut self.state)
    }

    /// Uniform draw in `0..bound` without modulo bias.
    pub fn next_bounded(&mut self, bound: u32) -> u32 {
        next_bounded_with(&mut self.state, bound, next_random_u32)
    }

    /// Uniform draw in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / (f64::from(u32::MAX) + 1.0)
    }

    /// Inclusive range.
    pub fn range(&mut self, min: i64, max: i64) -> Result<i64, QuillError> {
        if min > max {
            return Err(QuillError::new(
                codes::STATE_RANDOM_ARGUMENT,
                format!("random range min {} is above max {}.", min, max),
            ));
        }
        let span = (max as i128 - min as i128 + 1) as u128;
        if span > u128::from(u32::MAX) {
            return Err(QuillError::new(
                codes::STATE_RANDOM_ARGUMENT,
                format!("random range {}..={} is too wide.", min, max),
            ));
        }
        Ok(min + i64::from(self.next_bounded(span as u32)))
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.next_bounded(items.len() as u32) as usize;
        items.get(index)
    }

    /// Fisher-Yates, walking from the back.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for index in (1..items.len()).rev() {
            let other = self.next_bounded(index as u32 + 1) as usize;
            items.swap(index, other);
        }
    }

    /// Sum of `count` rolls of a `sides`-sided die.
    pub fn dice(&mut self, count: u32, sides: u32) -> Result<i64, QuillError> {
        if sides == 0 {
            return Err(QuillError::new(
                codes::STATE_RANDOM_ARGUMENT,
                "dice need at least one side.",
            ));
        }
        let mut total = 0i64;
        for _ in 0..count {
            total += i64::from(self.next_bounded(sides)) + 1;
        }
        Ok(total)
    }

    /// Weighted boolean: true with probability `probability` (clamped to 0..=1).
    pub fn chance(&mut self, probability: f64) -> bool {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        self.next_f64() < probability
    }
}

impl Default for RandomState {
    fn default() -> Self {
        Self::from_seed(1)
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = 0x811c_9dc5u32;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn next_random_u32(state: &mut u32) -> u32 {
    let mut next = state.wrapping_add(0x6d2b79f5);
    *state = next;
    next = (next ^ (next >> 15)).wrapping_mul(next | 1);
    next ^= next.wrapping_add((next ^ (next >> 7)).wrapping_mul(next | 61));
    next ^ (next >> 14)
}

fn next_bounded_with<F>(state: &mut u32, bound: u32, mut next: F) -> u32
where
    F: FnMut(&mut u32) -> u32,
{
    if bound <= 1 {
        return 0;
    }
    let threshold = (u64::from(u32::MAX) + 1) / u64::from(bound) * u64::from(bound);
    let mut candidate = next(state);
    while u64::from(candidate) >= threshold {
        candidate = next(state);
    }
    candidate % bound
}
