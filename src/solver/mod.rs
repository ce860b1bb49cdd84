//! Allocation solver.
//!
//! Ships relief supply from centers to zones at minimum transport cost. Each
//! resource kind is an independent transportation problem, balanced with a
//! *shortage* row (unmet demand, charged a priority-weighted penalty above
//! any real route cost) and a *surplus* column (unshipped stock, free). Two
//! formulations solve it:
//!
//! - `LinearProgram`: the balanced problem by transportation simplex.
//! - `MinCostFlow`: source -> centers -> zones -> sink, where each zone->sink
//!   arc pays out the zone's penalty as a reward, by successive shortest
//!   paths.
//!
//! Both optimize the same objective (real cost plus penalty on unmet units)
//! and report only real shipments, so they agree on total cost. Short supply
//! never fails; it shows up as partial coverage.

mod flow;
mod transport;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::graph::GraphSnapshot;
use crate::network::NodeId;
use crate::pathfinder::PathFinder;
use crate::resources::{
    AllocationPlan, Assignment, DisasterZone, PlanMethod, QUANTITY_EPSILON, ReliefCenter,
    validate_request,
};
use crate::traits::{CostMetric, Leg, TransportCostProvider};

use self::flow::FlowNetwork;
use self::transport::TransportProblem;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    #[default]
    LinearProgram,
    MinCostFlow,
}

impl From<AllocationMethod> for PlanMethod {
    fn from(method: AllocationMethod) -> Self {
        match method {
            AllocationMethod::LinearProgram => PlanMethod::LinearProgram,
            AllocationMethod::MinCostFlow => PlanMethod::MinCostFlow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationOptions {
    /// Leg figure charged per shipped unit.
    pub metric: CostMetric,
    /// Cap on simplex pivots (and flow augmentations) per resource kind.
    pub max_pivots: usize,
}

impl Default for AllocationOptions {
    fn default() -> Self {
        Self {
            metric: CostMetric::Time,
            max_pivots: 10_000,
        }
    }
}

// ============================================================================
// Cost providers
// ============================================================================

/// Network transport costs: fastest path over the snapshot, one
/// single-source search per origin, origins searched in parallel.
#[derive(Debug, Clone, Default)]
pub struct NetworkCosts {
    finder: PathFinder,
}

impl NetworkCosts {
    pub fn new(finder: PathFinder) -> Self {
        Self { finder }
    }
}

impl TransportCostProvider for NetworkCosts {
    fn legs_for(
        &self,
        snapshot: &GraphSnapshot,
        origins: &[NodeId],
        destinations: &[NodeId],
    ) -> Result<Vec<Vec<Option<Leg>>>> {
        let targets = destinations
            .iter()
            .map(|id| {
                snapshot
                    .node_index(id)
                    .ok_or_else(|| EngineError::not_found(format!("node \"{}\"", id)))
            })
            .collect::<Result<Vec<_>>>()?;

        origins
            .par_iter()
            .map(|origin| -> Result<Vec<Option<Leg>>> {
                let legs = self.finder.shortest_legs_from(snapshot, origin)?;
                Ok(targets.iter().map(|&ix| legs[ix]).collect())
            })
            .collect()
    }
}

/// Leg table between every center and every zone of a request.
#[derive(Debug, Clone)]
pub(crate) struct TransportTable {
    legs: Vec<Vec<Option<Leg>>>,
    metric: CostMetric,
}

impl TransportTable {
    pub fn build(
        provider: &dyn TransportCostProvider,
        snapshot: &GraphSnapshot,
        centers: &[ReliefCenter],
        zones: &[DisasterZone],
        metric: CostMetric,
    ) -> Result<Self> {
        let origins: Vec<NodeId> = centers.iter().map(|c| c.node.clone()).collect();
        let destinations: Vec<NodeId> = zones.iter().map(|z| z.node.clone()).collect();
        let legs = provider.legs_for(snapshot, &origins, &destinations)?;
        Ok(Self { legs, metric })
    }

    pub fn leg(&self, center: usize, zone: usize) -> Option<Leg> {
        self.legs.get(center).and_then(|row| row.get(zone).copied().flatten())
    }

    /// Per-unit cost, `None` when the pair is unreachable.
    pub fn unit_cost(&self, center: usize, zone: usize) -> Option<f64> {
        self.leg(center, zone)
            .map(|leg| self.metric.cost(&leg))
            .filter(|cost| cost.is_finite())
    }
}

/// Every resource kind any center stocks or any zone needs, sorted.
pub(crate) fn resource_kinds(centers: &[ReliefCenter], zones: &[DisasterZone]) -> Vec<String> {
    let mut kinds: Vec<String> = centers
        .iter()
        .flat_map(|c| c.stock.keys())
        .chain(zones.iter().flat_map(|z| z.needs.keys()))
        .cloned()
        .collect();
    kinds.sort();
    kinds.dedup();
    kinds
}

// ============================================================================
// Per-kind problem
// ============================================================================

/// One resource kind, restricted to centers holding it and zones needing it.
#[derive(Debug, Clone)]
struct KindProblem {
    kind: String,
    /// Indices into the request's centers.
    rows: Vec<usize>,
    /// Indices into the request's zones.
    cols: Vec<usize>,
    supply: Vec<f64>,
    demand: Vec<f64>,
    cost: Vec<Vec<Option<f64>>>,
    /// Cost per unmet unit, per column.
    penalty: Vec<f64>,
}

impl KindProblem {
    fn build(
        kind: &str,
        centers: &[ReliefCenter],
        zones: &[DisasterZone],
        table: &TransportTable,
    ) -> Option<Self> {
        let rows: Vec<usize> = (0..centers.len())
            .filter(|&i| centers[i].available(kind) > QUANTITY_EPSILON)
            .collect();
        let cols: Vec<usize> = (0..zones.len())
            .filter(|&j| zones[j].need(kind) > QUANTITY_EPSILON)
            .collect();
        if rows.is_empty() || cols.is_empty() {
            return None;
        }

        let cost: Vec<Vec<Option<f64>>> = rows
            .iter()
            .map(|&i| cols.iter().map(|&j| table.unit_cost(i, j)).collect())
            .collect();
        let max_cost = cost.iter().flatten().flatten().fold(0.0_f64, |acc, &c| acc.max(c));

        // Any augmenting path crosses at most min(rows, cols) real arcs, so
        // this base makes every unit of extra coverage worth its route.
        let base = max_cost * (rows.len().min(cols.len()) + 1) as f64 + 1.0;
        let penalty = cols.iter().map(|&j| base * (1.0 + zones[j].priority())).collect();

        Some(Self {
            kind: kind.to_string(),
            supply: rows.iter().map(|&i| centers[i].available(kind)).collect(),
            demand: cols.iter().map(|&j| zones[j].need(kind)).collect(),
            rows,
            cols,
            cost,
            penalty,
        })
    }

    fn epsilon(&self) -> f64 {
        let scale = self
            .penalty
            .iter()
            .chain(self.supply.iter())
            .chain(self.demand.iter())
            .fold(1.0_f64, |acc, v| acc.max(v.abs()));
        1e-12 * scale
    }

    /// Shipments as (row, col, quantity) with the transportation simplex.
    fn solve_linear_program(&self, max_pivots: usize) -> Vec<(usize, usize, f64)> {
        let (m, n) = (self.rows.len(), self.cols.len());
        let total_supply: f64 = self.supply.iter().sum();
        let total_demand: f64 = self.demand.iter().sum();
        let max_penalty = self.penalty.iter().fold(0.0_f64, |acc, &p| acc.max(p));
        let forbidden = 2.0 * max_penalty + 1.0;

        let mut supply = self.supply.clone();
        supply.push(total_demand);
        let mut demand = self.demand.clone();
        demand.push(total_supply);

        let mut cost = vec![vec![0.0; n + 1]; m + 1];
        let mut allowed = vec![vec![true; n + 1]; m + 1];
        for i in 0..m {
            for j in 0..n {
                match self.cost[i][j] {
                    Some(c) => cost[i][j] = c,
                    None => {
                        cost[i][j] = forbidden;
                        allowed[i][j] = false;
                    }
                }
            }
        }
        cost[m][..n].copy_from_slice(&self.penalty);

        let problem = TransportProblem {
            supply,
            demand,
            cost,
            allowed,
        };
        let solution = transport::solve(&problem, max_pivots);
        debug!(
            kind = %self.kind,
            pivots = solution.pivots,
            capped = solution.capped,
            "Transportation simplex"
        );

        let mut shipments = Vec::new();
        for i in 0..m {
            for j in 0..n {
                let x = solution.flow[i][j];
                if problem.allowed[i][j] && x > QUANTITY_EPSILON {
                    shipments.push((i, j, x));
                }
            }
        }
        shipments
    }

    /// Shipments as (row, col, quantity) with successive shortest paths.
    fn solve_min_cost_flow(&self, max_augmentations: usize) -> Vec<(usize, usize, f64)> {
        let (m, n) = (self.rows.len(), self.cols.len());
        let source = 0;
        let sink = m + n + 1;
        let center = |i: usize| 1 + i;
        let zone = |j: usize| 1 + m + j;

        let mut network = FlowNetwork::new(m + n + 2, self.epsilon());
        for (i, &supply) in self.supply.iter().enumerate() {
            network.add_arc(source, center(i), supply, 0.0);
        }
        let mut shipping_arcs = Vec::new();
        for i in 0..m {
            for j in 0..n {
                if let Some(c) = self.cost[i][j] {
                    let arc = network.add_arc(center(i), zone(j), f64::INFINITY, c);
                    shipping_arcs.push((i, j, arc));
                }
            }
        }
        for (j, (&demand, &penalty)) in self.demand.iter().zip(&self.penalty).enumerate() {
            network.add_arc(zone(j), sink, demand, -penalty);
        }

        let outcome = network.min_cost_flow(source, sink, max_augmentations);
        debug!(
            kind = %self.kind,
            flow = outcome.flow,
            augmentations = outcome.augmentations,
            "Min-cost flow"
        );

        shipping_arcs
            .into_iter()
            .map(|(i, j, arc)| (i, j, network.flow_on(arc)))
            .filter(|&(_, _, x)| x > QUANTITY_EPSILON)
            .collect()
    }
}

// ============================================================================
// Solver
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AllocationSolver {
    options: AllocationOptions,
}

impl AllocationSolver {
    pub fn new(options: AllocationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AllocationOptions {
        &self.options
    }

    /// Solves with network shortest-path costs from a default path finder.
    pub fn solve(
        &self,
        snapshot: &GraphSnapshot,
        centers: &[ReliefCenter],
        zones: &[DisasterZone],
        method: AllocationMethod,
    ) -> Result<AllocationPlan> {
        self.solve_with(snapshot, centers, zones, method, &NetworkCosts::default())
    }

    pub fn solve_with(
        &self,
        snapshot: &GraphSnapshot,
        centers: &[ReliefCenter],
        zones: &[DisasterZone],
        method: AllocationMethod,
        costs: &dyn TransportCostProvider,
    ) -> Result<AllocationPlan> {
        validate_request(snapshot, centers, zones)?;
        let table = TransportTable::build(costs, snapshot, centers, zones, self.options.metric)?;

        let mut assignments = Vec::new();
        for kind in resource_kinds(centers, zones) {
            let Some(problem) = KindProblem::build(&kind, centers, zones, &table) else {
                continue;
            };
            let shipments = match method {
                AllocationMethod::LinearProgram => {
                    problem.solve_linear_program(self.options.max_pivots)
                }
                AllocationMethod::MinCostFlow => {
                    problem.solve_min_cost_flow(self.options.max_pivots)
                }
            };

            for (row, col, quantity) in shipments {
                let (i, j) = (problem.rows[row], problem.cols[col]);
                let Some(leg) = table.leg(i, j) else {
                    continue;
                };
                assignments.push(Assignment {
                    center: centers[i].node.clone(),
                    zone: zones[j].node.clone(),
                    kind: kind.clone(),
                    quantity,
                    unit_cost: problem.cost[row][col].unwrap_or_default(),
                    travel_time_h: leg.time_h,
                });
            }
        }

        let plan = AllocationPlan::from_assignments(assignments, zones, method.into());
        info!(
            ?method,
            version = snapshot.version(),
            assignments = plan.assignments.len(),
            total_cost = plan.total_cost,
            coverage = plan.aggregate_coverage(),
            "Allocation solved"
        );
        Ok(plan)
    }
}
