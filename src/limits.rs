//! Iteration and wall-clock budgets.
//!
//! Every search in the engine runs under a `Budget`. When it runs out the
//! search stops and reports the best result found so far.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Caller-supplied cap on a search. `None` fields are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    /// Node expansions for path searches; generations or iterations for
    /// the metaheuristics.
    pub max_iterations: Option<usize>,
    pub time_limit: Option<Duration>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations: Some(max_iterations),
            time_limit: None,
        }
    }

    pub fn time_limit(limit: Duration) -> Self {
        Self {
            max_iterations: None,
            time_limit: Some(limit),
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Starts the clock, checking wall time on every tick.
    pub fn start(&self) -> BudgetClock {
        self.start_with_clock_mask(0)
    }

    /// Starts the clock, checking wall time only when
    /// `(ticks & clock_check_mask) == 0`. Cheap steps (node expansions)
    /// use a mask so `Instant::now` stays off the hot path.
    pub fn start_with_clock_mask(&self, clock_check_mask: u64) -> BudgetClock {
        let now = Instant::now();
        BudgetClock {
            max_iterations: self.max_iterations,
            deadline: self.time_limit.map(|limit| now + limit),
            clock_check_mask,
            ticks: 0,
            stopped: None,
        }
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The algorithm ran its configured course.
    Completed,
    /// Improvement stalled below the configured threshold.
    Converged,
    IterationLimit,
    TimeLimit,
}

impl StopReason {
    pub fn is_budget(self) -> bool {
        matches!(self, StopReason::IterationLimit | StopReason::TimeLimit)
    }
}

/// Running state of a `Budget`.
#[derive(Debug, Clone)]
pub struct BudgetClock {
    max_iterations: Option<usize>,
    deadline: Option<Instant>,
    clock_check_mask: u64,
    ticks: u64,
    stopped: Option<StopReason>,
}

impl BudgetClock {
    /// Records one unit of work and returns the stop reason once the budget
    /// is spent. Stays exhausted afterwards.
    pub fn tick(&mut self) -> Option<StopReason> {
        if self.stopped.is_some() {
            return self.stopped;
        }
        self.ticks = self.ticks.wrapping_add(1);

        if let Some(max) = self.max_iterations {
            if self.ticks >= max as u64 {
                self.stopped = Some(StopReason::IterationLimit);
                return self.stopped;
            }
        }
        if let Some(deadline) = self.deadline {
            if (self.ticks & self.clock_check_mask) == 0 && Instant::now() >= deadline {
                self.stopped = Some(StopReason::TimeLimit);
            }
        }
        self.stopped
    }

    /// Whether any work may start at all (a zero iteration budget or an
    /// already elapsed deadline allows none).
    pub fn allows_start(&mut self) -> Option<StopReason> {
        if self.max_iterations == Some(0) {
            self.stopped = Some(StopReason::IterationLimit);
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.stopped = Some(StopReason::TimeLimit);
        }
        self.stopped
    }

    pub fn ticks(&self) -> usize {
        self.ticks as usize
    }

    pub fn stopped(&self) -> Option<StopReason> {
        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_budget_stops_on_last_tick() {
        let mut clock = Budget::iterations(3).start();
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.tick(), Some(StopReason::IterationLimit));
        assert_eq!(clock.tick(), Some(StopReason::IterationLimit), "stays exhausted");
        assert_eq!(clock.ticks(), 3);
    }

    #[test]
    fn test_elapsed_deadline() {
        let mut clock = Budget::time_limit(Duration::ZERO).start();
        assert_eq!(clock.allows_start(), Some(StopReason::TimeLimit));
    }

    #[test]
    fn test_unlimited_never_stops() {
        let mut clock = Budget::unlimited().start();
        assert_eq!(clock.allows_start(), None);
        for _ in 0..10_000 {
            assert_eq!(clock.tick(), None);
        }
    }

    #[test]
    fn test_zero_iterations_allows_nothing() {
        let mut clock = Budget::iterations(0).start();
        assert_eq!(clock.allows_start(), Some(StopReason::IterationLimit));
    }
}
