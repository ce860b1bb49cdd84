//! Engine façade.
//!
//! Owns the graph store, route cache, mutator, path finder, allocation
//! solver, optimizer and resource inventory, and exposes the operations a
//! thin API layer calls. Queries read one snapshot each; mutations go
//! through the mutator only.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheStats, PathKind, RouteCache, RouteKey};
use crate::error::{EngineError, Result};
use crate::graph::{GraphSnapshot, GraphStore};
use crate::limits::Budget;
use crate::mutator::NetworkMutator;
use crate::network::{
    ConditionUpdate, EdgeId, NetworkDefinition, NodeId, RoadCondition, TrafficLevel,
};
use crate::optimizer::{MultiObjectiveOptimizer, OptimizationOutcome, OptimizerOptions, Strategy};
use crate::pathfinder::{
    PathAlgorithm, PathFinder, PathOptions, RouteResult, RouteStatus, RouteWeights, WeightedRoute,
};
use crate::resources::{AllocationPlan, DisasterZone, Inventory, ReliefCenter};
use crate::solver::{AllocationMethod, AllocationOptions, AllocationSolver, NetworkCosts};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Route cache entries; 0 disables caching.
    pub cache_capacity: usize,
    pub path: PathOptions,
    pub allocation: AllocationOptions,
    pub optimizer: OptimizerOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            path: PathOptions::default(),
            allocation: AllocationOptions::default(),
            optimizer: OptimizerOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Whether `allocate_from_inventory` changes the inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    #[default]
    PlanOnly,
    /// Decrement center stock and zone needs by the plan's shipments.
    Commit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub version: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub by_condition: BTreeMap<RoadCondition, usize>,
    pub by_traffic: BTreeMap<TrafficLevel, usize>,
    pub passable_edges: usize,
    pub blocked_edges: usize,
    pub cache: CacheStats,
}

pub struct ReliefEngine {
    config: EngineConfig,
    store: Arc<GraphStore>,
    cache: Arc<RouteCache>,
    mutator: NetworkMutator,
    path_finder: PathFinder,
    solver: AllocationSolver,
    optimizer: MultiObjectiveOptimizer,
    inventory: Mutex<Inventory>,
}

impl ReliefEngine {
    pub fn new(definition: &NetworkDefinition, config: EngineConfig) -> Result<Self> {
        let store = Arc::new(GraphStore::from_definition(definition)?);
        let cache = Arc::new(RouteCache::with_version(
            config.cache_capacity,
            store.current_version(),
        ));
        let mutator = NetworkMutator::new(Arc::clone(&store), Arc::clone(&cache));

        info!(
            version = store.current_version(),
            cache_capacity = config.cache_capacity,
            "Relief engine ready"
        );

        Ok(Self {
            path_finder: PathFinder::new(config.path.clone()),
            solver: AllocationSolver::new(config.allocation.clone()),
            optimizer: MultiObjectiveOptimizer::new(config.optimizer.clone()),
            inventory: Mutex::new(Inventory::new()),
            config,
            store,
            cache,
            mutator,
        })
    }

    /// Restores an engine from a network saved with `save_network`,
    /// including its conditions and version.
    pub fn load(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let definition = NetworkDefinition::load(path)?;
        Self::new(&definition, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.store.snapshot()
    }

    pub fn current_version(&self) -> u64 {
        self.store.current_version()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get_shortest_path(
        &self,
        origin: &NodeId,
        destination: &NodeId,
        mode: PathAlgorithm,
    ) -> Result<RouteResult> {
        let snapshot = self.store.snapshot();
        let key = RouteKey::new(origin, destination, PathKind::from(mode), snapshot.version());
        if let Some(routes) = self.cache.get(&key) {
            if let Some(route) = routes.first() {
                return Ok(route.clone());
            }
        }

        let route = self.path_finder.find(&snapshot, origin, destination, mode)?;
        self.cache.put(key, vec![route.clone()]);
        Ok(route)
    }

    pub fn get_alternatives(
        &self,
        origin: &NodeId,
        destination: &NodeId,
        k: usize,
    ) -> Result<Vec<RouteResult>> {
        let snapshot = self.store.snapshot();
        let key = RouteKey::new(origin, destination, PathKind::Alternatives(k), snapshot.version());
        if let Some(routes) = self.cache.get(&key) {
            return Ok(routes.to_vec());
        }

        let routes = self.path_finder.alternative_paths(&snapshot, origin, destination, k)?;
        self.cache.put(key, routes.clone());
        Ok(routes)
    }

    /// Fastest path that never passes through a node in `avoid`. Not cached.
    pub fn get_path_avoiding(
        &self,
        origin: &NodeId,
        destination: &NodeId,
        mode: PathAlgorithm,
        avoid: &HashSet<NodeId>,
    ) -> Result<RouteResult> {
        let snapshot = self.store.snapshot();
        self.path_finder
            .find_avoiding(&snapshot, origin, destination, mode, avoid)
    }

    /// Path minimizing a blend of time, distance and road state. Not cached.
    pub fn get_weighted_path(
        &self,
        origin: &NodeId,
        destination: &NodeId,
        weights: &RouteWeights,
        avoid: &HashSet<NodeId>,
    ) -> Result<WeightedRoute> {
        let snapshot = self.store.snapshot();
        self.path_finder
            .weighted_path(&snapshot, origin, destination, weights, avoid)
    }

    pub fn get_network_stats(&self) -> NetworkStats {
        let snapshot = self.store.snapshot();
        let mut by_condition: BTreeMap<RoadCondition, usize> =
            RoadCondition::ALL.into_iter().map(|c| (c, 0)).collect();
        let mut by_traffic: BTreeMap<TrafficLevel, usize> =
            TrafficLevel::ALL.into_iter().map(|t| (t, 0)).collect();
        let mut blocked_edges = 0;

        for edge in snapshot.edges() {
            *by_condition.entry(edge.condition).or_insert(0) += 1;
            *by_traffic.entry(edge.traffic).or_insert(0) += 1;
            if !edge.is_passable() {
                blocked_edges += 1;
            }
        }

        NetworkStats {
            version: snapshot.version(),
            node_count: snapshot.node_count(),
            edge_count: snapshot.edge_count(),
            by_condition,
            by_traffic,
            passable_edges: snapshot.edge_count() - blocked_edges,
            blocked_edges,
            cache: self.cache.stats(),
        }
    }

    /// Re-reads a previously returned route against the current network.
    pub fn route_status(&self, route: &RouteResult) -> Result<RouteStatus> {
        self.path_finder.reevaluate(&self.store.snapshot(), route)
    }

    /// The current network, conditions and version included.
    pub fn export_network(&self) -> NetworkDefinition {
        self.store.snapshot().to_definition()
    }

    pub fn save_network(&self, path: impl AsRef<Path>) -> Result<()> {
        let definition = self.export_network();
        definition.save(path)?;
        debug!(version = definition.version, "Network saved");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub fn apply_condition_update(
        &self,
        edge: EdgeId,
        condition: Option<RoadCondition>,
        traffic: Option<TrafficLevel>,
    ) -> Result<u64> {
        self.mutator.apply_condition_update(edge, condition, traffic)
    }

    pub fn apply_batch(&self, updates: &[ConditionUpdate]) -> Result<u64> {
        self.mutator.apply_batch(updates)
    }

    pub fn close_road(&self, from: &NodeId, to: &NodeId) -> Result<u64> {
        self.mutator.close_road(from, to)
    }

    pub fn restore_road(&self, from: &NodeId, to: &NodeId) -> Result<u64> {
        self.mutator.restore_road(from, to)
    }

    // ------------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------------

    pub fn solve_allocation(
        &self,
        supply: &[ReliefCenter],
        demand: &[DisasterZone],
        method: AllocationMethod,
    ) -> Result<AllocationPlan> {
        let snapshot = self.store.snapshot();
        let costs = NetworkCosts::new(self.path_finder.clone());
        self.solver.solve_with(&snapshot, supply, demand, method, &costs)
    }

    pub fn optimize_multi_objective(
        &self,
        supply: &[ReliefCenter],
        demand: &[DisasterZone],
        strategy: &Strategy,
        budget: &Budget,
    ) -> Result<OptimizationOutcome> {
        let snapshot = self.store.snapshot();
        let costs = NetworkCosts::new(self.path_finder.clone());
        self.optimizer
            .optimize_with(&snapshot, supply, demand, strategy, budget, &costs)
    }

    // ------------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------------

    /// Registers (or replaces) a relief center. The node must exist.
    pub fn register_center(&self, center: ReliefCenter) -> Result<Option<ReliefCenter>> {
        self.check_node(&center.node)?;
        Ok(self.lock_inventory().register_center(center))
    }

    /// Registers (or replaces) a disaster zone. The node must exist.
    pub fn register_zone(&self, zone: DisasterZone) -> Result<Option<DisasterZone>> {
        self.check_node(&zone.node)?;
        Ok(self.lock_inventory().register_zone(zone))
    }

    /// A copy of the current inventory.
    pub fn inventory(&self) -> Inventory {
        self.lock_inventory().clone()
    }

    /// Plans over every registered center and zone. In `Commit` mode the
    /// plan's shipments are deducted from the inventory before returning.
    pub fn allocate_from_inventory(
        &self,
        method: AllocationMethod,
        mode: PlanMode,
    ) -> Result<AllocationPlan> {
        let mut inventory = self.lock_inventory();
        let plan = self.solve_allocation(&inventory.centers(), &inventory.zones(), method)?;
        if mode == PlanMode::Commit {
            inventory.apply(&plan)?;
            info!(
                assignments = plan.assignments.len(),
                total_cost = plan.total_cost,
                "Committed allocation plan to inventory"
            );
        }
        Ok(plan)
    }

    fn lock_inventory(&self) -> MutexGuard<'_, Inventory> {
        self.inventory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_node(&self, node: &NodeId) -> Result<()> {
        if self.store.snapshot().contains_node(node) {
            Ok(())
        } else {
            Err(EngineError::not_found(format!("node \"{}\"", node)))
        }
    }
}
