use std::cell::Cell;
use std::time::{Duration, Instant};

use ql_core::{codes, QuillError, SandboxLimits};

/// Weighted instruction and wall-clock budget for one top-level evaluation.
/// Nested evaluations triggered by module calls charge the same budget.
#[derive(Debug)]
pub(crate) struct Budget {
    limit: u64,
    timeout: Duration,
    interval: u64,
    started: Instant,
    spent: Cell<u64>,
    next_checkpoint: Cell<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BudgetBreach {
    Instructions { spent: u64, limit: u64 },
    Timeout { elapsed_ms: u128, limit_ms: u128 },
}

impl BudgetBreach {
    pub(crate) fn into_error(self) -> QuillError {
        let message = match self {
            Self::Instructions { spent, limit } => format!(
                "Script used {} weighted instructions; the limit is {}.",
                spent, limit
            ),
            Self::Timeout {
                elapsed_ms,
                limit_ms,
            } => format!(
                "Script ran for {}ms; the limit is {}ms.",
                elapsed_ms, limit_ms
            ),
        };
        QuillError::new(codes::SCRIPT_RESOURCE_LIMIT, message)
            .suggest("Simplify the script or raise the sandbox limits.")
    }
}

impl Budget {
    pub(crate) fn start(limits: &SandboxLimits) -> Self {
        let interval = limits.checkpoint_interval.max(1);
        Self {
            limit: limits.max_instructions,
            timeout: Duration::from_millis(limits.timeout_ms),
            interval,
            started: Instant::now(),
            spent: Cell::new(0),
            next_checkpoint: Cell::new(interval),
        }
    }

    pub(crate) fn spent(&self) -> u64 {
        self.spent.get()
    }

    /// Adds `weight`; limits are only compared when a checkpoint is crossed.
    pub(crate) fn charge(&self, weight: u64) -> Result<(), BudgetBreach> {
        let spent = self.spent.get().saturating_add(weight);
        self.spent.set(spent);
        if spent < self.next_checkpoint.get() {
            return Ok(());
        }
        self.next_checkpoint.set(spent.saturating_add(self.interval));
        self.check()
    }

    pub(crate) fn check(&self) -> Result<(), BudgetBreach> {
        let spent = self.spent.get();
        if spent > self.limit {
            return Err(BudgetBreach::Instructions {
                spent,
                limit: self.limit,
            });
        }
        let elapsed = self.started.elapsed();
        if elapsed > self.timeout {
            return Err(BudgetBreach::Timeout {
                elapsed_ms: elapsed.as_millis(),
                limit_ms: self.timeout.as_millis(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod budget_tests {
    use super::*;

    fn limits(max_instructions: u64, checkpoint_interval: u64) -> SandboxLimits {
        SandboxLimits {
            max_instructions,
            checkpoint_interval,
            timeout_ms: 60_000,
            ..SandboxLimits::default()
        }
    }

    #[test]
    fn breach_is_only_seen_at_checkpoints() {
        let budget = Budget::start(&limits(10, 8));
        for _ in 0..7 {
            budget.charge(1).expect("below checkpoint");
        }
        budget.charge(1).expect("checkpoint at 8 is within limit");
        budget.charge(5).expect("13 is past the limit but before the next checkpoint");
        assert_eq!(
            budget.charge(3),
            Err(BudgetBreach::Instructions {
                spent: 16,
                limit: 10
            })
        );
    }

    #[test]
    fn zero_timeout_trips_on_first_check() {
        let budget = Budget::start(&SandboxLimits {
            timeout_ms: 0,
            ..SandboxLimits::default()
        });
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(budget.check(), Err(BudgetBreach::Timeout { .. })));
        assert_eq!(
            BudgetBreach::Timeout {
                elapsed_ms: 5,
                limit_ms: 0
            }
            .into_error()
            .code,
            codes::SCRIPT_RESOURCE_LIMIT
        );
    }
}
