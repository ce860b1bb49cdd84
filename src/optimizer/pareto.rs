//! NSGA-II Pareto search.
//!
//! Objectives: minimize cost, maximize coverage, minimize average response
//! time. Survivors are chosen front by front, with crowding distance
//! breaking the tie inside the last front that fits.

use std::cmp::Ordering;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::limits::{Budget, StopReason};
use crate::resources::ObjectiveVector;

use super::SearchResult;
use super::encoding::{Candidate, Genome, Model};

/// Objective values closer than this count as the same point.
const DUPLICATE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParetoOptions {
    pub population_size: usize,
    pub generations: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
}

impl Default for ParetoOptions {
    fn default() -> Self {
        Self {
            population_size: 40,
            generations: 100,
            crossover_rate: 0.9,
            mutation_rate: 0.1,
        }
    }
}

/// Fast non-dominated sort. Returns fronts of indices, best first.
pub(crate) fn non_dominated_fronts(points: &[ObjectiveVector]) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut dominated_by = vec![0usize; n];
    let mut dominates: Vec<Vec<usize>> = vec![Vec::new(); n];

    for p in 0..n {
        for q in (p + 1)..n {
            if points[p].dominates(&points[q]) {
                dominates[p].push(q);
                dominated_by[q] += 1;
            } else if points[q].dominates(&points[p]) {
                dominates[q].push(p);
                dominated_by[p] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&p| dominated_by[p] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominates[p] {
                dominated_by[q] -= 1;
                if dominated_by[q] == 0 {
                    next.push(q);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }
    fronts
}

/// Crowding distance of each member of `front`, in the same order.
pub(crate) fn crowding_distance(points: &[ObjectiveVector], front: &[usize]) -> Vec<f64> {
    let mut distance = vec![0.0; front.len()];
    if front.len() <= 2 {
        return vec![f64::INFINITY; front.len()];
    }

    let objectives: [fn(&ObjectiveVector) -> f64; 3] =
        [|v| v.cost, |v| v.coverage, |v| v.response_time_h];
    for objective in objectives {
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| {
            objective(&points[front[a]]).total_cmp(&objective(&points[front[b]]))
        });

        let low = objective(&points[front[order[0]]]);
        let high = objective(&points[front[order[order.len() - 1]]]);
        distance[order[0]] = f64::INFINITY;
        distance[order[order.len() - 1]] = f64::INFINITY;
        let span = high - low;
        if span <= 0.0 {
            continue;
        }
        for w in 1..order.len() - 1 {
            let before = objective(&points[front[order[w - 1]]]);
            let after = objective(&points[front[order[w + 1]]]);
            distance[order[w]] += (after - before) / span;
        }
    }
    distance
}

/// (rank, crowding) per population member.
fn rank_and_crowd(population: &[Candidate]) -> (Vec<usize>, Vec<f64>) {
    let points: Vec<ObjectiveVector> = population.iter().map(|c| c.plan.objectives).collect();
    let mut rank = vec![0; population.len()];
    let mut crowd = vec![0.0; population.len()];
    for (r, front) in non_dominated_fronts(&points).iter().enumerate() {
        let distances = crowding_distance(&points, front);
        for (&member, d) in front.iter().zip(distances) {
            rank[member] = r;
            crowd[member] = d;
        }
    }
    (rank, crowd)
}

/// Binary tournament on (lower rank, then larger crowding distance).
fn tournament<R: Rng>(rank: &[usize], crowd: &[f64], rng: &mut R) -> usize {
    let a = rng.gen_range(0..rank.len());
    let b = rng.gen_range(0..rank.len());
    match rank[a].cmp(&rank[b]) {
        Ordering::Less => a,
        Ordering::Greater => b,
        Ordering::Equal => {
            if crowd[a] >= crowd[b] {
                a
            } else {
                b
            }
        }
    }
}

/// Keeps the best `size` members of the merged population.
fn select_survivors(merged: Vec<Candidate>, size: usize) -> Vec<Candidate> {
    let points: Vec<ObjectiveVector> = merged.iter().map(|c| c.plan.objectives).collect();
    let mut keep: Vec<usize> = Vec::with_capacity(size);

    for front in non_dominated_fronts(&points) {
        if keep.len() + front.len() <= size {
            keep.extend(&front);
            continue;
        }
        let distances = crowding_distance(&points, &front);
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| distances[b].total_cmp(&distances[a]).then(front[a].cmp(&front[b])));
        keep.extend(order.into_iter().take(size - keep.len()).map(|ix| front[ix]));
        break;
    }

    keep.sort_unstable();
    let mut slots: Vec<Option<Candidate>> = merged.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|ix| slots[ix].take()).collect()
}

fn same_point(a: &ObjectiveVector, b: &ObjectiveVector) -> bool {
    (a.cost - b.cost).abs() <= DUPLICATE_TOLERANCE * (1.0 + a.cost.abs())
        && (a.coverage - b.coverage).abs() <= DUPLICATE_TOLERANCE
        && (a.response_time_h - b.response_time_h).abs()
            <= DUPLICATE_TOLERANCE * (1.0 + a.response_time_h.abs())
}

/// First front of `population`, deduplicated, by ascending cost.
fn first_front(population: Vec<Candidate>) -> Vec<Candidate> {
    let points: Vec<ObjectiveVector> = population.iter().map(|c| c.plan.objectives).collect();
    let front = non_dominated_fronts(&points).into_iter().next().unwrap_or_default();

    let mut slots: Vec<Option<Candidate>> = population.into_iter().map(Some).collect();
    let mut members: Vec<Candidate> = front.into_iter().filter_map(|ix| slots[ix].take()).collect();
    members.sort_by(|a, b| {
        a.plan
            .objectives
            .cost
            .total_cmp(&b.plan.objectives.cost)
            .then(b.plan.objectives.coverage.total_cmp(&a.plan.objectives.coverage))
    });

    let mut unique: Vec<Candidate> = Vec::with_capacity(members.len());
    for candidate in members {
        if !unique
            .iter()
            .any(|kept| same_point(&kept.plan.objectives, &candidate.plan.objectives))
        {
            unique.push(candidate);
        }
    }
    unique
}

pub(crate) fn run<R: Rng>(
    model: &Model<'_>,
    options: &ParetoOptions,
    budget: &Budget,
    rng: &mut R,
) -> SearchResult {
    let size = options.population_size.max(2);

    let mut genomes: Vec<Genome> = Vec::with_capacity(size);
    genomes.push(model.greedy_genome());
    while genomes.len() < size {
        genomes.push(model.random_genome(rng));
    }
    let mut population = model.evaluate_all(genomes);

    let mut generation = 0;
    let mut clock = budget.start();
    let mut stop = clock.allows_start();

    while stop.is_none() {
        if generation >= options.generations {
            stop = Some(StopReason::Completed);
            break;
        }

        let (rank, crowd) = rank_and_crowd(&population);
        let mut offspring: Vec<Genome> = Vec::with_capacity(size);
        while offspring.len() < size {
            let first = &population[tournament(&rank, &crowd, rng)].genome;
            let second = &population[tournament(&rank, &crowd, rng)].genome;
            let mut child = if rng.gen_bool(options.crossover_rate.clamp(0.0, 1.0)) {
                model.uniform_crossover(first, second, rng)
            } else {
                first.clone()
            };
            model.mutate(&mut child, options.mutation_rate, rng);
            offspring.push(child);
        }

        let mut merged = population;
        merged.extend(model.evaluate_all(offspring));
        population = select_survivors(merged, size);
        generation += 1;

        if generation % 10 == 0 {
            debug!(generation, "Pareto search progress");
        }
        stop = clock.tick();
    }

    let stop = stop.unwrap_or(StopReason::Completed);
    if stop.is_budget() {
        warn!(generation, ?stop, "Pareto search budget exhausted; returning current front");
    }

    SearchResult {
        solutions: first_front(population),
        iterations: generation,
        stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(cost: f64, coverage: f64, response_time_h: f64) -> ObjectiveVector {
        ObjectiveVector {
            cost,
            coverage,
            response_time_h,
        }
    }

    #[test]
    fn test_fronts() {
        let points = vec![
            point(1.0, 0.5, 1.0), // front 0
            point(2.0, 1.0, 1.0), // front 0
            point(2.0, 0.5, 1.0), // dominated by 0
            point(3.0, 0.4, 2.0), // dominated by 0 and 2
        ];
        let fronts = non_dominated_fronts(&points);
        assert_eq!(fronts, vec![vec![0, 1], vec![2], vec![3]]);
    }

    #[test]
    fn test_crowding_boundaries_are_infinite() {
        let points = vec![point(1.0, 0.1, 1.0), point(2.0, 0.5, 1.0), point(3.0, 0.9, 1.0)];
        let distances = crowding_distance(&points, &[0, 1, 2]);
        assert!(distances[0].is_infinite());
        assert!(distances[2].is_infinite());
        assert!((distances[1] - 2.0).abs() < 1e-12);
    }
}
