//! The single write path into the graph store.
//!
//! Every successful call publishes exactly one new graph version and
//! invalidates the route cache for it.

use std::sync::Arc;

use tracing::info;

use crate::cache::RouteCache;
use crate::error::{EngineError, Result};
use crate::graph::GraphStore;
use crate::network::{ConditionUpdate, EdgeId, NodeId, RoadCondition, TrafficLevel};

#[derive(Debug, Clone)]
pub struct NetworkMutator {
    store: Arc<GraphStore>,
    cache: Arc<RouteCache>,
}

impl NetworkMutator {
    pub fn new(store: Arc<GraphStore>, cache: Arc<RouteCache>) -> Self {
        Self { store, cache }
    }

    /// Updates one edge's condition and/or traffic. Re-applying an unchanged
    /// value still bumps the version.
    pub fn apply_condition_update(
        &self,
        edge: EdgeId,
        condition: Option<RoadCondition>,
        traffic: Option<TrafficLevel>,
    ) -> Result<u64> {
        let version = self.store.apply_mutation(edge, condition, traffic)?;
        self.cache.invalidate(version);
        info!(
            version,
            edge = %edge,
            condition = ?condition,
            traffic = ?traffic,
            "Applied condition update"
        );
        Ok(version)
    }

    /// Applies every update as one version bump. An unknown edge rejects the
    /// whole batch with `InvalidInput` and the version stays put.
    pub fn apply_batch(&self, updates: &[ConditionUpdate]) -> Result<u64> {
        let version = self.store.apply_batch(updates)?;
        self.cache.invalidate(version);
        info!(version, updates = updates.len(), "Applied condition batch");
        Ok(version)
    }

    /// Marks the road between two nodes `blocked` in both directions (where
    /// both exist).
    pub fn close_road(&self, from: &NodeId, to: &NodeId) -> Result<u64> {
        self.set_road_condition(from, to, RoadCondition::Blocked)
    }

    /// Returns a closed road to `good`.
    pub fn restore_road(&self, from: &NodeId, to: &NodeId) -> Result<u64> {
        self.set_road_condition(from, to, RoadCondition::Good)
    }

    fn set_road_condition(
        &self,
        from: &NodeId,
        to: &NodeId,
        condition: RoadCondition,
    ) -> Result<u64> {
        let edges = self.road_edges(from, to)?;
        let updates: Vec<ConditionUpdate> = edges
            .into_iter()
            .map(|edge| ConditionUpdate::condition(edge, condition))
            .collect();
        self.apply_batch(&updates)
    }

    fn road_edges(&self, from: &NodeId, to: &NodeId) -> Result<Vec<EdgeId>> {
        let snapshot = self.store.snapshot();
        for id in [from, to] {
            if !snapshot.contains_node(id) {
                return Err(EngineError::not_found(format!("node \"{}\"", id)));
            }
        }

        let edges: Vec<EdgeId> = [snapshot.edge_between(from, to), snapshot.edge_between(to, from)]
            .into_iter()
            .flatten()
            .collect();
        if edges.is_empty() {
            return Err(EngineError::not_found(format!("road {} -> {}", from, to)));
        }
        Ok(edges)
    }
}
