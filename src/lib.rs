//! relief-router core
//!
//! Dynamic routing and resource allocation over a road network whose
//! conditions change during a disaster: versioned graph snapshots, shortest
//! and alternative paths, a version-scoped route cache, LP and min-cost-flow
//! allocation, and seeded multi-objective search.

pub mod cache;
pub mod engine;
pub mod error;
pub mod graph;
pub mod haversine;
pub mod limits;
pub mod mutator;
pub mod network;
pub mod optimizer;
pub mod pathfinder;
pub mod polyline;
pub mod resources;
pub mod solver;
pub mod traits;

pub use cache::{CacheStats, PathKind, RouteCache, RouteKey};
pub use engine::{EngineConfig, NetworkStats, PlanMode, ReliefEngine};
pub use error::{EngineError, Result};
pub use graph::{GraphSnapshot, GraphStore};
pub use haversine::HaversineCosts;
pub use limits::{Budget, StopReason};
pub use mutator::NetworkMutator;
pub use network::{
    ConditionUpdate, Edge, EdgeId, NetworkDefinition, Node, NodeId, NodeKind, RoadCondition,
    TrafficLevel,
};
pub use optimizer::{
    MultiObjectiveOptimizer, ObjectiveWeights, OptimizationOutcome, OptimizerOptions, Strategy,
};
pub use pathfinder::{
    PathAlgorithm, PathFinder, PathOptions, RouteResult, RouteStatus, RouteWeights, WeightedRoute,
};
pub use resources::{
    AllocationPlan, Assignment, DisasterZone, Inventory, ReliefCenter, ZoneCoverage,
};
pub use solver::{AllocationMethod, AllocationOptions, AllocationSolver, NetworkCosts};
pub use traits::{CostMetric, Leg, TransportCostProvider};
