//! Simulated annealing over allocation genomes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::limits::{Budget, StopReason};

use super::SearchResult;
use super::encoding::Model;

/// Annealing steps between wall-clock checks (2^6).
const CLOCK_CHECK_MASK: u64 = 0x3F;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnealingStart {
    /// Cheapest source, full share, for every demand item.
    #[default]
    Greedy,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingOptions {
    /// Starting temperature, in score units.
    pub initial_temperature: f64,
    /// Geometric factor applied after every step, in (0, 1).
    pub cooling_rate: f64,
    /// The search stops once the temperature drops below this.
    pub min_temperature: f64,
    pub max_iterations: usize,
    pub start: AnnealingStart,
}

impl Default for AnnealingOptions {
    fn default() -> Self {
        Self {
            initial_temperature: 0.5,
            cooling_rate: 0.995,
            min_temperature: 1e-4,
            max_iterations: 20_000,
            start: AnnealingStart::Greedy,
        }
    }
}

/// T(k+1) = alpha * T(k).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricCooling {
    initial: f64,
    current: f64,
    alpha: f64,
    min_temp: f64,
}

impl GeometricCooling {
    /// `alpha` outside (0, 1) is clamped into it.
    pub fn new(initial: f64, alpha: f64, min_temp: f64) -> Self {
        let alpha = if alpha > 0.0 && alpha < 1.0 { alpha } else { 0.995 };
        Self {
            initial,
            current: initial,
            alpha,
            min_temp,
        }
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn update(&mut self) {
        self.current *= self.alpha;
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn is_frozen(&self) -> bool {
        self.current <= self.min_temp
    }
}

/// Metropolis criterion: always take improvements, take a worsening of
/// `delta` with probability exp(-delta / T).
fn accept<R: Rng>(delta: f64, temperature: f64, rng: &mut R) -> bool {
    if delta <= 0.0 {
        return true;
    }
    if temperature <= 0.0 || !delta.is_finite() {
        return false;
    }
    let probability = (-delta / temperature).exp();
    rng.gen_bool(probability.clamp(0.0, 1.0))
}

pub(crate) fn run<R: Rng>(
    model: &Model<'_>,
    options: &AnnealingOptions,
    budget: &Budget,
    rng: &mut R,
) -> SearchResult {
    let start = match options.start {
        AnnealingStart::Greedy => model.greedy_genome(),
        AnnealingStart::Random => model.random_genome(rng),
    };
    let mut current = model.evaluate(start);
    let mut best = current.clone();

    let mut cooling = GeometricCooling::new(
        options.initial_temperature,
        options.cooling_rate,
        options.min_temperature,
    );
    cooling.reset();

    let mut iteration = 0;
    let mut accepted = 0usize;
    let mut clock = budget.start_with_clock_mask(CLOCK_CHECK_MASK);
    let mut stop = clock.allows_start();

    while stop.is_none() {
        if cooling.is_frozen() || iteration >= options.max_iterations || model.gene_count() == 0 {
            stop = Some(StopReason::Completed);
            break;
        }

        let neighbour = model.evaluate(model.perturb(&current.genome, rng));
        if accept(neighbour.score - current.score, cooling.current(), rng) {
            current = neighbour;
            accepted += 1;
            if current.score < best.score {
                best = current.clone();
            }
        }
        cooling.update();
        iteration += 1;

        if iteration % 1000 == 0 {
            debug!(
                iteration,
                temperature = cooling.current(),
                best = best.score,
                "Annealing progress"
            );
        }
        stop = clock.tick();
    }

    let stop = stop.unwrap_or(StopReason::Completed);
    if stop.is_budget() {
        warn!(iteration, ?stop, "Annealing budget exhausted; returning best so far");
    }
    debug!(iteration, accepted, "Annealing finished");

    SearchResult {
        solutions: vec![best],
        iterations: iteration,
        stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_geometric_cooling_freezes() {
        let mut cooling = GeometricCooling::new(1.0, 0.5, 0.1);
        assert!(!cooling.is_frozen());
        for _ in 0..4 {
            cooling.update();
        }
        assert!(cooling.is_frozen());
        cooling.reset();
        assert_eq!(cooling.current(), 1.0);
    }

    #[test]
    fn test_metropolis_acceptance() {
        let mut rng = SmallRng::seed_from_u64(3);
        assert!(accept(-1.0, 0.0, &mut rng), "improvements are always taken");
        assert!(!accept(1.0, 0.0, &mut rng), "a frozen search never worsens");

        let hot = (0..1000).filter(|_| accept(0.01, 10.0, &mut rng)).count();
        let cold = (0..1000).filter(|_| accept(1.0, 0.05, &mut rng)).count();
        assert!(hot > 950);
        assert!(cold < 10);
    }
}
