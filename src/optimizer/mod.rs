//! Multi-objective allocation search.
//!
//! Trades transport cost against coverage and response time with one of
//! three seeded metaheuristics:
//!
//! - `Genetic`: weighted-sum fitness, roulette selection, uniform crossover,
//!   elitism, stall detection.
//! - `Annealing`: single-gene perturbations, Metropolis acceptance,
//!   geometric cooling.
//! - `Pareto`: NSGA-II; returns the whole first front.
//!
//! Runs are reproducible for a given seed and iteration budget. When the
//! budget runs out the best plans found so far are returned.

mod annealing;
mod encoding;
mod genetic;
mod pareto;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::graph::GraphSnapshot;
use crate::limits::{Budget, StopReason};
use crate::resources::{AllocationPlan, DisasterZone, PlanMethod, ReliefCenter, validate_request};
use crate::solver::{NetworkCosts, TransportTable};
use crate::traits::{CostMetric, TransportCostProvider};

use self::encoding::Model;

pub use self::annealing::{AnnealingOptions, AnnealingStart, GeometricCooling};
pub use self::genetic::GeneticOptions;
pub use self::pareto::ParetoOptions;

/// Weights of the scalar score used by the genetic and annealing searches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub cost: f64,
    pub coverage: f64,
    pub response: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            cost: 0.3,
            coverage: 0.5,
            response: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    pub seed: u64,
    pub weights: ObjectiveWeights,
    pub metric: CostMetric,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            weights: ObjectiveWeights::default(),
            metric: CostMetric::Time,
        }
    }
}

/// Search strategy, chosen per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    Genetic(GeneticOptions),
    Annealing(AnnealingOptions),
    Pareto(ParetoOptions),
}

impl Strategy {
    pub fn genetic() -> Self {
        Strategy::Genetic(GeneticOptions::default())
    }

    pub fn annealing() -> Self {
        Strategy::Annealing(AnnealingOptions::default())
    }

    pub fn pareto() -> Self {
        Strategy::Pareto(ParetoOptions::default())
    }

    pub fn method(&self) -> PlanMethod {
        match self {
            Strategy::Genetic(_) => PlanMethod::Genetic,
            Strategy::Annealing(_) => PlanMethod::Annealing,
            Strategy::Pareto(_) => PlanMethod::Pareto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPlan {
    pub plan: AllocationPlan,
    /// Weighted scalar objective; lower is better.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub strategy: PlanMethod,
    /// One plan for the scalar searches; the first front, by ascending cost,
    /// for Pareto search.
    pub solutions: Vec<ScoredPlan>,
    /// Generations or annealing steps run.
    pub iterations: usize,
    pub stop: StopReason,
}

impl OptimizationOutcome {
    /// Lowest-score plan.
    pub fn best(&self) -> Option<&ScoredPlan> {
        self.solutions.iter().min_by(|a, b| a.score.total_cmp(&b.score))
    }
}

/// What a strategy run hands back.
#[derive(Debug)]
pub(crate) struct SearchResult {
    pub solutions: Vec<encoding::Candidate>,
    pub iterations: usize,
    pub stop: StopReason,
}

#[derive(Debug, Clone, Default)]
pub struct MultiObjectiveOptimizer {
    options: OptimizerOptions,
}

impl MultiObjectiveOptimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    pub fn optimize(
        &self,
        snapshot: &GraphSnapshot,
        centers: &[ReliefCenter],
        zones: &[DisasterZone],
        strategy: &Strategy,
        budget: &Budget,
    ) -> Result<OptimizationOutcome> {
        self.optimize_with(snapshot, centers, zones, strategy, budget, &NetworkCosts::default())
    }

    pub fn optimize_with(
        &self,
        snapshot: &GraphSnapshot,
        centers: &[ReliefCenter],
        zones: &[DisasterZone],
        strategy: &Strategy,
        budget: &Budget,
        costs: &dyn TransportCostProvider,
    ) -> Result<OptimizationOutcome> {
        validate_request(snapshot, centers, zones)?;
        let table = TransportTable::build(costs, snapshot, centers, zones, self.options.metric)?;
        let method = strategy.method();
        let model = Model::new(centers, zones, &table, self.options.weights, method);
        let mut rng = SmallRng::seed_from_u64(self.options.seed);

        let result = match strategy {
            Strategy::Genetic(options) => genetic::run(&model, options, budget, &mut rng),
            Strategy::Annealing(options) => annealing::run(&model, options, budget, &mut rng),
            Strategy::Pareto(options) => pareto::run(&model, options, budget, &mut rng),
        };

        let solutions: Vec<ScoredPlan> = result
            .solutions
            .into_iter()
            .map(|candidate| ScoredPlan {
                plan: candidate.plan,
                score: candidate.score,
            })
            .collect();

        info!(
            ?method,
            version = snapshot.version(),
            iterations = result.iterations,
            stop = ?result.stop,
            solutions = solutions.len(),
            "Multi-objective search finished"
        );

        Ok(OptimizationOutcome {
            strategy: method,
            solutions,
            iterations: result.iterations,
            stop: result.stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serde_tag() {
        let json = r#"{"strategy":"annealing","initial_temperature":2.0}"#;
        let strategy: Strategy = serde_json::from_str(json).unwrap();
        match strategy {
            Strategy::Annealing(options) => {
                assert_eq!(options.initial_temperature, 2.0);
                assert_eq!(options.cooling_rate, AnnealingOptions::default().cooling_rate);
            }
            other => panic!("expected annealing, got {:?}", other),
        }
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ObjectiveWeights::default();
        assert!((w.cost + w.coverage + w.response - 1.0).abs() < 1e-12);
    }
}
