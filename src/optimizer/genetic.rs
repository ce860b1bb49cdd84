//! Generational genetic search over allocation genomes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::limits::{Budget, StopReason};

use super::SearchResult;
use super::encoding::{Candidate, Genome, Model};

/// Keeps fitness finite for a zero score.
const FITNESS_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticOptions {
    pub population_size: usize,
    pub max_generations: usize,
    pub crossover_rate: f64,
    /// Per-gene mutation probability.
    pub mutation_rate: f64,
    /// Best candidates copied unchanged into the next generation.
    pub elite_count: usize,
    /// Generations without improvement before the search stops.
    pub stall_generations: usize,
    /// Smallest score decrease that counts as improvement.
    pub improvement_threshold: f64,
}

impl Default for GeneticOptions {
    fn default() -> Self {
        Self {
            population_size: 40,
            max_generations: 200,
            crossover_rate: 0.9,
            mutation_rate: 0.1,
            elite_count: 2,
            stall_generations: 25,
            improvement_threshold: 1e-6,
        }
    }
}

pub(crate) fn run<R: Rng>(
    model: &Model<'_>,
    options: &GeneticOptions,
    budget: &Budget,
    rng: &mut R,
) -> SearchResult {
    let size = options.population_size.max(2);
    let elites = options.elite_count.min(size);

    let mut genomes: Vec<Genome> = Vec::with_capacity(size);
    genomes.push(model.greedy_genome());
    while genomes.len() < size {
        genomes.push(model.random_genome(rng));
    }
    let mut population = model.evaluate_all(genomes);
    sort_by_score(&mut population);

    let mut best = population[0].clone();
    let mut stalled = 0;
    let mut generation = 0;
    let mut clock = budget.start();
    let mut stop = clock.allows_start();

    while stop.is_none() {
        if generation >= options.max_generations {
            stop = Some(StopReason::Completed);
            break;
        }

        let fitness: Vec<f64> = population
            .iter()
            .map(|c| 1.0 / (FITNESS_EPSILON + c.score))
            .collect();
        let mut next: Vec<Genome> = population[..elites].iter().map(|c| c.genome.clone()).collect();
        while next.len() < size {
            let first = &population[roulette(&fitness, rng)].genome;
            let second = &population[roulette(&fitness, rng)].genome;
            let mut child = if rng.gen_bool(options.crossover_rate.clamp(0.0, 1.0)) {
                model.uniform_crossover(first, second, rng)
            } else {
                first.clone()
            };
            model.mutate(&mut child, options.mutation_rate, rng);
            next.push(child);
        }

        population = model.evaluate_all(next);
        sort_by_score(&mut population);
        generation += 1;

        let leader = &population[0];
        if best.score - leader.score > options.improvement_threshold {
            stalled = 0;
        } else {
            stalled += 1;
        }
        if leader.score < best.score {
            best = leader.clone();
        }
        if generation % 10 == 0 {
            debug!(generation, best = best.score, "Genetic search progress");
        }

        if options.stall_generations > 0 && stalled >= options.stall_generations {
            stop = Some(StopReason::Converged);
        } else if let Some(reason) = clock.tick() {
            stop = Some(reason);
        }
    }

    let stop = stop.unwrap_or(StopReason::Completed);
    if stop.is_budget() {
        warn!(generation, ?stop, "Genetic search budget exhausted; returning best so far");
    }

    SearchResult {
        solutions: vec![best],
        iterations: generation,
        stop,
    }
}

fn sort_by_score(population: &mut [Candidate]) {
    population.sort_by(|a, b| a.score.total_cmp(&b.score));
}

/// Fitness-proportionate pick.
fn roulette<R: Rng>(fitness: &[f64], rng: &mut R) -> usize {
    let total: f64 = fitness.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return rng.gen_range(0..fitness.len());
    }
    let mut target = rng.gen_range(0.0..total);
    for (ix, f) in fitness.iter().enumerate() {
        if target < *f {
            return ix;
        }
        target -= f;
    }
    fitness.len() - 1
}
