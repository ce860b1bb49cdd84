//! Supply, demand and allocation plan records.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::graph::GraphSnapshot;
use crate::network::NodeId;

/// Quantities below this are treated as zero.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Units per affected person at severity 10, by resource kind.
const NEED_RATES: [(&str, f64); 4] = [
    ("food", 0.3),
    ("water", 1.5),
    ("medical", 0.1),
    ("blankets", 0.2),
];

/// A (kind, quantity, unit) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
}

impl Resource {
    pub fn new(kind: impl Into<String>, quantity: f64, unit: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            quantity,
            unit: unit.into(),
        }
    }
}

/// Supply node: resource stock held at a network node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliefCenter {
    pub node: NodeId,
    #[serde(default)]
    pub stock: BTreeMap<String, f64>,
    /// Upper bound on total stock across kinds.
    #[serde(default)]
    pub capacity: Option<f64>,
}

impl ReliefCenter {
    pub fn new(node: impl Into<NodeId>) -> Self {
        Self {
            node: node.into(),
            stock: BTreeMap::new(),
            capacity: None,
        }
    }

    pub fn with_stock(mut self, kind: &str, quantity: f64) -> Self {
        *self.stock.entry(kind.to_string()).or_insert(0.0) += quantity;
        self
    }

    pub fn with_resource(self, resource: &Resource) -> Self {
        self.with_stock(&resource.kind, resource.quantity)
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn available(&self, kind: &str) -> f64 {
        self.stock.get(kind).copied().unwrap_or(0.0)
    }

    pub fn total_stock(&self) -> f64 {
        self.stock.values().sum()
    }
}

/// Demand node: resource needs plus the figures its priority derives from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterZone {
    pub node: NodeId,
    #[serde(default)]
    pub needs: BTreeMap<String, f64>,
    /// 0 (minor) to 10 (catastrophic).
    pub severity: f64,
    #[serde(default)]
    pub population_affected: u64,
}

impl DisasterZone {
    pub fn new(node: impl Into<NodeId>, severity: f64) -> Self {
        Self {
            node: node.into(),
            needs: BTreeMap::new(),
            severity,
            population_affected: 0,
        }
    }

    pub fn with_need(mut self, kind: &str, quantity: f64) -> Self {
        *self.needs.entry(kind.to_string()).or_insert(0.0) += quantity;
        self
    }

    pub fn with_population(mut self, population_affected: u64) -> Self {
        self.population_affected = population_affected;
        self
    }

    pub fn need(&self, kind: &str) -> f64 {
        self.needs.get(kind).copied().unwrap_or(0.0)
    }

    pub fn total_need(&self) -> f64 {
        self.needs.values().sum()
    }

    /// Priority in [0, 10]: 60% severity, 40% population (saturating at
    /// 10,000 people).
    pub fn priority(&self) -> f64 {
        let population_score = (self.population_affected as f64 / 1000.0).min(10.0);
        (0.6 * self.severity + 0.4 * population_score).clamp(0.0, 10.0)
    }

    /// Whole-unit needs estimated from population and severity, for zones
    /// that have not reported any.
    pub fn estimated_needs(&self) -> BTreeMap<String, f64> {
        let scale = (self.severity / 10.0).clamp(0.0, 1.0);
        let population = self.population_affected as f64;
        NEED_RATES
            .iter()
            .map(|(kind, rate)| (kind.to_string(), (population * rate * scale).floor()))
            .collect()
    }

    /// Fills in estimated needs for kinds the zone has not reported.
    pub fn with_estimated_needs(mut self) -> Self {
        for (kind, quantity) in self.estimated_needs() {
            self.needs.entry(kind).or_insert(quantity);
        }
        self
    }
}

// ============================================================================
// Plans
// ============================================================================

/// How a plan was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMethod {
    LinearProgram,
    MinCostFlow,
    Genetic,
    Annealing,
    Pareto,
}

/// One shipment of a single resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub center: NodeId,
    pub zone: NodeId,
    pub kind: String,
    pub quantity: f64,
    /// Transport cost per unit.
    pub unit_cost: f64,
    pub travel_time_h: f64,
}

impl Assignment {
    pub fn cost(&self) -> f64 {
        self.quantity * self.unit_cost
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneCoverage {
    pub zone: NodeId,
    pub demanded: f64,
    pub fulfilled: f64,
    /// fulfilled / demanded; 1.0 for a zone with no demand.
    pub coverage: f64,
    /// Shortfall per kind. Only kinds with a shortfall appear.
    pub unmet: BTreeMap<String, f64>,
}

/// (cost, coverage, average response time). Lower cost and time and higher
/// coverage are better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveVector {
    pub cost: f64,
    pub coverage: f64,
    pub response_time_h: f64,
}

impl ObjectiveVector {
    /// Pareto dominance: no worse in every objective, better in one.
    pub fn dominates(&self, other: &ObjectiveVector) -> bool {
        let no_worse = self.cost <= other.cost
            && self.coverage >= other.coverage
            && self.response_time_h <= other.response_time_h;
        let better = self.cost < other.cost
            || self.coverage > other.coverage
            || self.response_time_h < other.response_time_h;
        no_worse && better
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub assignments: Vec<Assignment>,
    pub total_cost: f64,
    pub zone_coverage: Vec<ZoneCoverage>,
    pub objectives: ObjectiveVector,
    pub method: PlanMethod,
}

impl AllocationPlan {
    /// Builds a plan from raw shipments: merges repeats of the same
    /// (center, zone, kind), drops empty ones and derives coverage and
    /// objectives against `zones`.
    pub fn from_assignments(
        assignments: Vec<Assignment>,
        zones: &[DisasterZone],
        method: PlanMethod,
    ) -> Self {
        let mut merged: BTreeMap<(NodeId, String, NodeId), Assignment> = BTreeMap::new();
        for assignment in assignments {
            if assignment.quantity <= QUANTITY_EPSILON {
                continue;
            }
            let key = (assignment.zone.clone(), assignment.kind.clone(), assignment.center.clone());
            let quantity = assignment.quantity;
            merged
                .entry(key)
                .and_modify(|existing| existing.quantity += quantity)
                .or_insert(assignment);
        }
        let assignments: Vec<Assignment> = merged.into_values().collect();

        let mut delivered: HashMap<(&NodeId, &str), f64> = HashMap::new();
        let mut slowest: BTreeMap<&NodeId, f64> = BTreeMap::new();
        for assignment in &assignments {
            *delivered
                .entry((&assignment.zone, assignment.kind.as_str()))
                .or_insert(0.0) += assignment.quantity;
            let time = slowest.entry(&assignment.zone).or_insert(0.0);
            *time = time.max(assignment.travel_time_h);
        }

        let zone_coverage: Vec<ZoneCoverage> = zones
            .iter()
            .map(|zone| {
                let mut fulfilled = 0.0;
                let mut unmet = BTreeMap::new();
                for (kind, &need) in &zone.needs {
                    let got = delivered
                        .get(&(&zone.node, kind.as_str()))
                        .copied()
                        .unwrap_or(0.0)
                        .min(need);
                    fulfilled += got;
                    if need - got > QUANTITY_EPSILON {
                        unmet.insert(kind.clone(), need - got);
                    }
                }
                let demanded = zone.total_need();
                ZoneCoverage {
                    zone: zone.node.clone(),
                    demanded,
                    fulfilled,
                    coverage: coverage_fraction(fulfilled, demanded),
                    unmet,
                }
            })
            .collect();

        let total_cost = assignments.iter().map(Assignment::cost).sum();
        let demanded: f64 = zone_coverage.iter().map(|z| z.demanded).sum();
        let fulfilled: f64 = zone_coverage.iter().map(|z| z.fulfilled).sum();
        let response_time_h = if slowest.is_empty() {
            0.0
        } else {
            slowest.values().sum::<f64>() / slowest.len() as f64
        };

        Self {
            assignments,
            total_cost,
            zone_coverage,
            objectives: ObjectiveVector {
                cost: total_cost,
                coverage: coverage_fraction(fulfilled, demanded),
                response_time_h,
            },
            method,
        }
    }

    /// Fulfilled over demanded across all zones.
    pub fn aggregate_coverage(&self) -> f64 {
        self.objectives.coverage
    }

    pub fn coverage_for(&self, zone: &NodeId) -> Option<&ZoneCoverage> {
        self.zone_coverage.iter().find(|z| &z.zone == zone)
    }

    /// Total shipped of `kind` out of `center`.
    pub fn shipped_from(&self, center: &NodeId, kind: &str) -> f64 {
        self.assignments
            .iter()
            .filter(|a| &a.center == center && a.kind == kind)
            .map(|a| a.quantity)
            .sum()
    }
}

fn coverage_fraction(fulfilled: f64, demanded: f64) -> f64 {
    if demanded <= QUANTITY_EPSILON {
        1.0
    } else {
        (fulfilled / demanded).clamp(0.0, 1.0)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Checks an allocation request against a snapshot.
pub(crate) fn validate_request(
    snapshot: &GraphSnapshot,
    centers: &[ReliefCenter],
    zones: &[DisasterZone],
) -> Result<()> {
    if centers.is_empty() && zones.is_empty() {
        return Err(EngineError::infeasible("no relief centers and no disaster zones"));
    }

    let mut seen = HashSet::new();
    for center in centers {
        if !seen.insert(&center.node) {
            return Err(EngineError::invalid(format!(
                "relief center \"{}\" listed twice",
                center.node
            )));
        }
        ensure_node(snapshot, &center.node)?;
        for (kind, &quantity) in &center.stock {
            ensure_quantity(&center.node, kind, quantity)?;
        }
        if let Some(capacity) = center.capacity {
            if !(capacity.is_finite() && capacity >= 0.0) {
                return Err(EngineError::invalid(format!(
                    "relief center \"{}\" has invalid capacity {}",
                    center.node, capacity
                )));
            }
            if center.total_stock() > capacity + QUANTITY_EPSILON {
                return Err(EngineError::invalid(format!(
                    "relief center \"{}\" holds {} units, above its capacity {}",
                    center.node,
                    center.total_stock(),
                    capacity
                )));
            }
        }
    }

    let mut seen = HashSet::new();
    for zone in zones {
        if !seen.insert(&zone.node) {
            return Err(EngineError::invalid(format!(
                "disaster zone \"{}\" listed twice",
                zone.node
            )));
        }
        ensure_node(snapshot, &zone.node)?;
        if !(zone.severity.is_finite() && (0.0..=10.0).contains(&zone.severity)) {
            return Err(EngineError::invalid(format!(
                "disaster zone \"{}\" severity {} is outside 0-10",
                zone.node, zone.severity
            )));
        }
        for (kind, &quantity) in &zone.needs {
            ensure_quantity(&zone.node, kind, quantity)?;
        }
    }
    Ok(())
}

fn ensure_node(snapshot: &GraphSnapshot, node: &NodeId) -> Result<()> {
    if snapshot.contains_node(node) {
        Ok(())
    } else {
        Err(EngineError::not_found(format!("node \"{}\"", node)))
    }
}

fn ensure_quantity(node: &NodeId, kind: &str, quantity: f64) -> Result<()> {
    if kind.trim().is_empty() {
        return Err(EngineError::invalid(format!(
            "node \"{}\" lists a resource with an empty kind",
            node
        )));
    }
    if !(quantity.is_finite() && quantity >= 0.0) {
        return Err(EngineError::invalid(format!(
            "node \"{}\" has invalid {} quantity {}",
            node, kind, quantity
        )));
    }
    Ok(())
}

// ============================================================================
// Inventory
// ============================================================================

/// Registered centers and zones, mutated only by committed plans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    centers: BTreeMap<NodeId, ReliefCenter>,
    zones: BTreeMap<NodeId, DisasterZone>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the center registered at `center.node`.
    pub fn register_center(&mut self, center: ReliefCenter) -> Option<ReliefCenter> {
        self.centers.insert(center.node.clone(), center)
    }

    /// Adds or replaces the zone registered at `zone.node`.
    pub fn register_zone(&mut self, zone: DisasterZone) -> Option<DisasterZone> {
        self.zones.insert(zone.node.clone(), zone)
    }

    pub fn center(&self, node: &NodeId) -> Option<&ReliefCenter> {
        self.centers.get(node)
    }

    pub fn zone(&self, node: &NodeId) -> Option<&DisasterZone> {
        self.zones.get(node)
    }

    pub fn centers(&self) -> Vec<ReliefCenter> {
        self.centers.values().cloned().collect()
    }

    pub fn zones(&self) -> Vec<DisasterZone> {
        self.zones.values().cloned().collect()
    }

    /// Decrements center stock and zone needs by the plan's shipments. The
    /// plan is checked in full first; on error nothing changes.
    pub fn apply(&mut self, plan: &AllocationPlan) -> Result<()> {
        let mut outgoing: HashMap<(&NodeId, &str), f64> = HashMap::new();
        for assignment in &plan.assignments {
            if !self.centers.contains_key(&assignment.center) {
                return Err(EngineError::not_found(format!(
                    "relief center \"{}\"",
                    assignment.center
                )));
            }
            if !self.zones.contains_key(&assignment.zone) {
                return Err(EngineError::not_found(format!(
                    "disaster zone \"{}\"",
                    assignment.zone
                )));
            }
            *outgoing
                .entry((&assignment.center, assignment.kind.as_str()))
                .or_insert(0.0) += assignment.quantity;
        }
        for ((center, kind), quantity) in &outgoing {
            let available = self.centers.get(*center).map_or(0.0, |c| c.available(kind));
            if *quantity > available + QUANTITY_EPSILON {
                return Err(EngineError::invalid(format!(
                    "plan ships {} {} from \"{}\" which holds {}",
                    quantity, kind, center, available
                )));
            }
        }

        for assignment in &plan.assignments {
            if let Some(center) = self.centers.get_mut(&assignment.center) {
                if let Some(stock) = center.stock.get_mut(&assignment.kind) {
                    *stock = (*stock - assignment.quantity).max(0.0);
                }
            }
            if let Some(zone) = self.zones.get_mut(&assignment.zone) {
                if let Some(need) = zone.needs.get_mut(&assignment.kind) {
                    *need = (*need - assignment.quantity).max(0.0);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(
        center: &str,
        zone: &str,
        kind: &str,
        quantity: f64,
        unit_cost: f64,
        time: f64,
    ) -> Assignment {
        Assignment {
            center: center.into(),
            zone: zone.into(),
            kind: kind.to_string(),
            quantity,
            unit_cost,
            travel_time_h: time,
        }
    }

    #[test]
    fn test_priority_formula() {
        let zone = DisasterZone::new("dz1", 8.0).with_population(5000);
        assert!((zone.priority() - (0.6 * 8.0 + 0.4 * 5.0)).abs() < 1e-12);

        let saturated = DisasterZone::new("dz2", 10.0).with_population(1_000_000);
        assert_eq!(saturated.priority(), 10.0);
    }

    #[test]
    fn test_estimated_needs_scale_with_severity() {
        let zone = DisasterZone::new("dz3", 9.0).with_population(8000);
        let needs = zone.estimated_needs();
        assert_eq!(needs["food"], 2160.0);
        assert_eq!(needs["water"], 10_800.0);
        assert_eq!(needs["medical"], 720.0);
        assert_eq!(needs["blankets"], 1440.0);

        let calm = DisasterZone::new("dz4", 0.0).with_population(8000);
        assert!(calm.estimated_needs().values().all(|q| *q == 0.0));
    }

    #[test]
    fn test_reported_needs_win_over_estimates() {
        let zone = DisasterZone::new("dz1", 5.0)
            .with_population(1001)
            .with_need("water", 40.0)
            .with_estimated_needs();
        assert_eq!(zone.need("water"), 40.0);
        assert_eq!(zone.need("food"), 150.0, "1001 * 0.3 * 0.5 rounds down");
        assert_eq!(zone.need("medical"), 50.0);
        assert_eq!(zone.need("blankets"), 100.0);
    }

    #[test]
    fn test_plan_coverage_and_objectives() {
        let zones = vec![
            DisasterZone::new("dz1", 5.0).with_need("water", 100.0),
            DisasterZone::new("dz2", 5.0).with_need("food", 50.0).with_need("water", 50.0),
            DisasterZone::new("dz3", 1.0),
        ];
        let plan = AllocationPlan::from_assignments(
            vec![
                assignment("rc1", "dz1", "water", 60.0, 0.5, 0.5),
                assignment("rc1", "dz1", "water", 40.0, 0.5, 0.5),
                assignment("rc2", "dz2", "food", 25.0, 1.0, 1.5),
                assignment("rc2", "dz2", "water", 0.0, 1.0, 9.0),
            ],
            &zones,
            PlanMethod::LinearProgram,
        );

        assert_eq!(plan.assignments.len(), 2, "repeats merge and empty shipments drop");
        assert!((plan.total_cost - 75.0).abs() < 1e-9);

        let dz1 = plan.coverage_for(&"dz1".into()).unwrap();
        assert_eq!(dz1.coverage, 1.0);
        assert!(dz1.unmet.is_empty());

        let dz2 = plan.coverage_for(&"dz2".into()).unwrap();
        assert!((dz2.coverage - 0.25).abs() < 1e-12);
        assert_eq!(dz2.unmet.get("water"), Some(&50.0));

        let dz3 = plan.coverage_for(&"dz3".into()).unwrap();
        assert_eq!(dz3.coverage, 1.0, "zone without demand counts as covered");

        assert!((plan.aggregate_coverage() - 125.0 / 200.0).abs() < 1e-12);
        assert!((plan.objectives.response_time_h - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dominance() {
        let a = ObjectiveVector { cost: 10.0, coverage: 0.9, response_time_h: 1.0 };
        let b = ObjectiveVector { cost: 12.0, coverage: 0.9, response_time_h: 1.0 };
        let c = ObjectiveVector { cost: 8.0, coverage: 0.5, response_time_h: 1.0 };
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(!a.dominates(&c) && !c.dominates(&a));
        assert!(!a.dominates(&a), "a vector never dominates itself");
    }

    #[test]
    fn test_inventory_commit_is_all_or_nothing() {
        let mut inventory = Inventory::new();
        inventory.register_center(ReliefCenter::new("rc1").with_stock("water", 100.0));
        inventory.register_zone(DisasterZone::new("dz1", 5.0).with_need("water", 80.0));

        let zones = inventory.zones();
        let too_much = AllocationPlan::from_assignments(
            vec![assignment("rc1", "dz1", "water", 150.0, 1.0, 1.0)],
            &zones,
            PlanMethod::MinCostFlow,
        );
        assert!(inventory.apply(&too_much).is_err());
        assert_eq!(inventory.center(&"rc1".into()).unwrap().available("water"), 100.0);

        let plan = AllocationPlan::from_assignments(
            vec![assignment("rc1", "dz1", "water", 80.0, 1.0, 1.0)],
            &zones,
            PlanMethod::MinCostFlow,
        );
        inventory.apply(&plan).unwrap();
        assert_eq!(inventory.center(&"rc1".into()).unwrap().available("water"), 20.0);
        assert_eq!(inventory.zone(&"dz1".into()).unwrap().need("water"), 0.0);
    }
}
