//! Candidate encoding shared by the metaheuristics.
//!
//! A genome holds one gene per (zone, kind) demand item: which reachable
//! center to draw from first and what share of the need to ship. Decoding is
//! deterministic, so a genome always maps to the same plan.

use rand::Rng;
use rayon::prelude::*;

use crate::resources::{
    AllocationPlan, Assignment, DisasterZone, PlanMethod, QUANTITY_EPSILON, ReliefCenter,
};
use crate::solver::{TransportTable, resource_kinds};

use super::ObjectiveWeights;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Gene {
    /// Index into the item's source list.
    pub source: usize,
    /// Requested share of the item's need, in [0, 1].
    pub share: f64,
}

pub(crate) type Genome = Vec<Gene>;

#[derive(Debug, Clone)]
struct DemandItem {
    zone: usize,
    kind_ix: usize,
    need: f64,
    /// Reachable centers stocking the kind, cheapest first: (center, unit cost).
    sources: Vec<(usize, f64)>,
}

/// A decoded and scored genome.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub genome: Genome,
    pub plan: AllocationPlan,
    /// Weighted scalar objective; lower is better.
    pub score: f64,
}

#[derive(Debug)]
pub(crate) struct Model<'a> {
    centers: &'a [ReliefCenter],
    zones: &'a [DisasterZone],
    table: &'a TransportTable,
    kinds: Vec<String>,
    items: Vec<DemandItem>,
    weights: ObjectiveWeights,
    method: PlanMethod,
    cost_scale: f64,
    time_scale: f64,
}

impl<'a> Model<'a> {
    pub fn new(
        centers: &'a [ReliefCenter],
        zones: &'a [DisasterZone],
        table: &'a TransportTable,
        weights: ObjectiveWeights,
        method: PlanMethod,
    ) -> Self {
        let kinds = resource_kinds(centers, zones);
        let mut items = Vec::new();
        for (zone_ix, zone) in zones.iter().enumerate() {
            for (kind_ix, kind) in kinds.iter().enumerate() {
                let need = zone.need(kind);
                if need <= QUANTITY_EPSILON {
                    continue;
                }
                let mut sources: Vec<(usize, f64)> = (0..centers.len())
                    .filter(|&c| centers[c].available(kind) > QUANTITY_EPSILON)
                    .filter_map(|c| table.unit_cost(c, zone_ix).map(|cost| (c, cost)))
                    .collect();
                sources.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                items.push(DemandItem {
                    zone: zone_ix,
                    kind_ix,
                    need,
                    sources,
                });
            }
        }
        // Most urgent zones draw on stock first.
        items.sort_by(|a, b| {
            zones[b.zone]
                .priority()
                .total_cmp(&zones[a.zone].priority())
                .then(a.zone.cmp(&b.zone))
                .then(a.kind_ix.cmp(&b.kind_ix))
        });

        let cost_scale = items
            .iter()
            .map(|item| item.need * item.sources.last().map_or(0.0, |s| s.1))
            .sum::<f64>();
        let time_scale = items
            .iter()
            .flat_map(|item| item.sources.iter().filter_map(|&(c, _)| table.leg(c, item.zone)))
            .fold(0.0_f64, |acc, leg| acc.max(leg.time_h));

        Self {
            centers,
            zones,
            table,
            kinds,
            items,
            weights,
            method,
            cost_scale: if cost_scale > 0.0 { cost_scale } else { 1.0 },
            time_scale: if time_scale > 0.0 { time_scale } else { 1.0 },
        }
    }

    pub fn gene_count(&self) -> usize {
        self.items.len()
    }

    fn source_count(&self, item: usize) -> usize {
        self.items[item].sources.len()
    }

    /// Cheapest source, full share, for every item.
    pub fn greedy_genome(&self) -> Genome {
        vec![Gene { source: 0, share: 1.0 }; self.items.len()]
    }

    pub fn random_genome<R: Rng>(&self, rng: &mut R) -> Genome {
        (0..self.items.len()).map(|item| self.random_gene(item, rng)).collect()
    }

    fn random_gene<R: Rng>(&self, item: usize, rng: &mut R) -> Gene {
        let sources = self.source_count(item);
        Gene {
            source: if sources > 1 { rng.gen_range(0..sources) } else { 0 },
            // Biased towards full coverage: half the genes ship everything.
            share: if rng.gen_bool(0.5) { 1.0 } else { rng.gen_range(0.0..=1.0) },
        }
    }

    /// Picks each gene from either parent with equal probability.
    pub fn uniform_crossover<R: Rng>(&self, a: &Genome, b: &Genome, rng: &mut R) -> Genome {
        a.iter()
            .zip(b)
            .map(|(x, y)| if rng.gen_bool(0.5) { x.clone() } else { y.clone() })
            .collect()
    }

    /// Redraws each gene with probability `rate`.
    pub fn mutate<R: Rng>(&self, genome: &mut Genome, rate: f64, rng: &mut R) {
        let rate = rate.clamp(0.0, 1.0);
        for item in 0..genome.len() {
            if rng.gen_bool(rate) {
                self.tweak_gene(genome, item, rng);
            }
        }
    }

    /// Changes a single random gene. Used as the annealing neighbourhood.
    pub fn perturb<R: Rng>(&self, genome: &Genome, rng: &mut R) -> Genome {
        let mut next = genome.clone();
        if !next.is_empty() {
            let item = rng.gen_range(0..next.len());
            self.tweak_gene(&mut next, item, rng);
        }
        next
    }

    fn tweak_gene<R: Rng>(&self, genome: &mut Genome, item: usize, rng: &mut R) {
        let sources = self.source_count(item);
        let gene = &mut genome[item];
        if sources > 1 && rng.gen_bool(0.5) {
            gene.source = rng.gen_range(0..sources);
        } else {
            let step = rng.gen_range(-0.25..=0.25);
            gene.share = (gene.share + step).clamp(0.0, 1.0);
        }
    }

    /// Ships each item from its preferred source up to share * need, then
    /// spills the rest of that amount over the other sources, cheapest first.
    pub fn decode(&self, genome: &Genome) -> AllocationPlan {
        let mut stock: Vec<Vec<f64>> = self
            .centers
            .iter()
            .map(|center| self.kinds.iter().map(|kind| center.available(kind)).collect())
            .collect();
        let mut assignments = Vec::new();

        for (item, gene) in self.items.iter().zip(genome) {
            if item.sources.is_empty() {
                continue;
            }
            let preferred = gene.source.min(item.sources.len() - 1);
            let mut wanted = gene.share.clamp(0.0, 1.0) * item.need;

            let order = std::iter::once(item.sources[preferred]).chain(
                item.sources
                    .iter()
                    .enumerate()
                    .filter(|&(ix, _)| ix != preferred)
                    .map(|(_, &source)| source),
            );
            for (center, unit_cost) in order {
                if wanted <= QUANTITY_EPSILON {
                    break;
                }
                let available = &mut stock[center][item.kind_ix];
                let quantity = wanted.min(*available);
                if quantity <= QUANTITY_EPSILON {
                    continue;
                }
                *available -= quantity;
                wanted -= quantity;
                assignments.push(Assignment {
                    center: self.centers[center].node.clone(),
                    zone: self.zones[item.zone].node.clone(),
                    kind: self.kinds[item.kind_ix].clone(),
                    quantity,
                    unit_cost,
                    travel_time_h: self.table.leg(center, item.zone).map_or(0.0, |leg| leg.time_h),
                });
            }
        }

        AllocationPlan::from_assignments(assignments, self.zones, self.method)
    }

    /// Weighted sum of normalized cost, uncovered fraction and normalized
    /// response time.
    pub fn score(&self, plan: &AllocationPlan) -> f64 {
        let objectives = &plan.objectives;
        self.weights.cost * objectives.cost / self.cost_scale
            + self.weights.coverage * (1.0 - objectives.coverage)
            + self.weights.response * objectives.response_time_h / self.time_scale
    }

    pub fn evaluate(&self, genome: Genome) -> Candidate {
        let plan = self.decode(&genome);
        let score = self.score(&plan);
        Candidate { genome, plan, score }
    }

    /// Decodes and scores a population in parallel, preserving order.
    pub fn evaluate_all(&self, genomes: Vec<Genome>) -> Vec<Candidate> {
        genomes.into_par_iter().map(|genome| self.evaluate(genome)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphStore;
    use crate::haversine::HaversineCosts;
    use crate::network::{NetworkDefinition, NodeKind};
    use crate::traits::CostMetric;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn fixture() -> (GraphStore, Vec<ReliefCenter>, Vec<DisasterZone>) {
        let def = NetworkDefinition::new()
            .with_node("rc1", NodeKind::ReliefCenter, 40.70, -74.00)
            .with_node("rc2", NodeKind::ReliefCenter, 40.80, -74.00)
            .with_node("dz1", NodeKind::DisasterZone, 40.71, -74.00)
            .with_node("dz2", NodeKind::DisasterZone, 40.79, -74.00);
        let store = GraphStore::from_definition(&def).unwrap();
        let centers = vec![
            ReliefCenter::new("rc1").with_stock("water", 50.0),
            ReliefCenter::new("rc2").with_stock("water", 50.0),
        ];
        let zones = vec![
            DisasterZone::new("dz1", 3.0).with_need("water", 40.0),
            DisasterZone::new("dz2", 9.0).with_need("water", 40.0),
        ];
        (store, centers, zones)
    }

    fn straight_line_table(
        store: &GraphStore,
        centers: &[ReliefCenter],
        zones: &[DisasterZone],
    ) -> TransportTable {
        let costs = HaversineCosts::default();
        TransportTable::build(&costs, &store.snapshot(), centers, zones, CostMetric::Time).unwrap()
    }

    fn genetic_model<'a>(
        centers: &'a [ReliefCenter],
        zones: &'a [DisasterZone],
        table: &'a TransportTable,
    ) -> Model<'a> {
        Model::new(centers, zones, table, ObjectiveWeights::default(), PlanMethod::Genetic)
    }

    #[test]
    fn test_greedy_decodes_to_nearest_sources() {
        let (store, centers, zones) = fixture();
        let table = straight_line_table(&store, &centers, &zones);
        let model = genetic_model(&centers, &zones, &table);
        let plan = model.decode(&model.greedy_genome());

        assert_eq!(plan.aggregate_coverage(), 1.0);
        assert_eq!(plan.shipped_from(&"rc1".into(), "water"), 40.0);
        assert_eq!(plan.shipped_from(&"rc2".into(), "water"), 40.0);
    }

    #[test]
    fn test_preferred_source_spills_when_empty() {
        let (store, centers, mut zones) = fixture();
        zones[1] = DisasterZone::new("dz2", 9.0).with_need("water", 80.0);
        let table = straight_line_table(&store, &centers, &zones);
        let model = genetic_model(&centers, &zones, &table);
        let plan = model.decode(&model.greedy_genome());

        // dz2 has the higher priority and takes 50 from rc2 plus 30 from rc1.
        let dz2 = plan.coverage_for(&"dz2".into()).unwrap();
        assert_eq!(dz2.coverage, 1.0);
        let dz1 = plan.coverage_for(&"dz1".into()).unwrap();
        assert!((dz1.fulfilled - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_operators_keep_genes_in_range() {
        let (store, centers, zones) = fixture();
        let table = straight_line_table(&store, &centers, &zones);
        let model = genetic_model(&centers, &zones, &table);
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..200 {
            let a = model.random_genome(&mut rng);
            let b = model.random_genome(&mut rng);
            let mut child = model.uniform_crossover(&a, &b, &mut rng);
            model.mutate(&mut child, 0.5, &mut rng);
            assert_eq!(child.len(), model.gene_count());
            for gene in &child {
                assert!(gene.source < 2);
                assert!((0.0..=1.0).contains(&gene.share));
            }
        }
    }
}
