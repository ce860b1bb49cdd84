//! Versioned graph store.
//!
//! A `GraphSnapshot` is an immutable view of the network at one version. The
//! node/edge layout (`Topology`) never changes after construction and is
//! shared by every snapshot; only the per-edge condition state is copied when
//! a mutation publishes version V+1. Readers hold an `Arc` to the snapshot
//! they started with, so a concurrent publication never changes data under
//! them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::haversine::haversine_km;
use crate::network::{
    ConditionUpdate, Edge, EdgeId, NetworkDefinition, Node, NodeDefinition, NodeId, RoadCondition,
    RoadDefinition, TrafficLevel, effective_time,
};

#[derive(Debug, Clone)]
struct EdgeGeometry {
    from: usize,
    to: usize,
    distance_km: f64,
    base_time_h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EdgeState {
    condition: RoadCondition,
    traffic: TrafficLevel,
}

#[derive(Debug)]
struct Topology {
    nodes: Vec<Node>,
    node_index: HashMap<NodeId, usize>,
    edges: Vec<EdgeGeometry>,
    outgoing: Vec<Vec<EdgeId>>,
    edge_lookup: HashMap<(usize, usize), EdgeId>,
    heuristic_speed_kmh: f64,
}

impl Topology {
    fn build(definition: &NetworkDefinition) -> Result<(Self, Vec<EdgeState>)> {
        let mut nodes = Vec::with_capacity(definition.nodes.len());
        let mut node_index = HashMap::with_capacity(definition.nodes.len());

        for node in &definition.nodes {
            validate_node(node)?;
            if node_index.insert(node.id.clone(), nodes.len()).is_some() {
                return Err(EngineError::invalid(format!("duplicate node id \"{}\"", node.id)));
            }
            nodes.push(Node {
                id: node.id.clone(),
                name: node.name.clone(),
                location: (node.lat, node.lng),
                kind: node.kind,
            });
        }

        let mut edges = Vec::new();
        let mut states = Vec::new();
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut edge_lookup = HashMap::new();

        for road in &definition.roads {
            validate_road(road)?;
            let from = lookup(&node_index, &road.from)?;
            let to = lookup(&node_index, &road.to)?;
            if from == to {
                return Err(EngineError::invalid(format!(
                    "road \"{}\" loops onto itself",
                    road.from
                )));
            }

            let state = EdgeState {
                condition: road.condition.unwrap_or(RoadCondition::Good),
                traffic: road.traffic.unwrap_or(TrafficLevel::Light),
            };
            let mut directions = vec![(from, to)];
            if road.bidirectional {
                directions.push((to, from));
            }

            for (a, b) in directions {
                let id = EdgeId(edges.len() as u32);
                if edge_lookup.insert((a, b), id).is_some() {
                    return Err(EngineError::invalid(format!(
                        "duplicate road {} -> {}",
                        nodes[a].id, nodes[b].id
                    )));
                }
                edges.push(EdgeGeometry {
                    from: a,
                    to: b,
                    distance_km: road.distance_km,
                    base_time_h: road.base_time_h(),
                });
                states.push(state);
                outgoing[a].push(id);
            }
        }

        let heuristic_speed_kmh = heuristic_speed_bound(&nodes, &edges);

        Ok((
            Self {
                nodes,
                node_index,
                edges,
                outgoing,
                edge_lookup,
                heuristic_speed_kmh,
            },
            states,
        ))
    }
}

fn lookup(index: &HashMap<NodeId, usize>, id: &NodeId) -> Result<usize> {
    index
        .get(id)
        .copied()
        .ok_or_else(|| EngineError::not_found(format!("node \"{}\"", id)))
}

fn validate_node(node: &NodeDefinition) -> Result<()> {
    if node.id.as_str().trim().is_empty() {
        return Err(EngineError::invalid("node id must not be empty"));
    }
    if !(node.lat.is_finite() && (-90.0..=90.0).contains(&node.lat))
        || !(node.lng.is_finite() && (-180.0..=180.0).contains(&node.lng))
    {
        return Err(EngineError::invalid(format!(
            "node \"{}\" has invalid coordinates ({}, {})",
            node.id, node.lat, node.lng
        )));
    }
    Ok(())
}

fn validate_road(road: &RoadDefinition) -> Result<()> {
    let time = road.base_time_h();
    let valid_distance = road.distance_km.is_finite() && road.distance_km >= 0.0;
    if !valid_distance || !(time.is_finite() && time >= 0.0) {
        return Err(EngineError::invalid(format!(
            "road {} -> {} has invalid distance {} km / time {} h",
            road.from, road.to, road.distance_km, time
        )));
    }
    Ok(())
}

/// Fastest straight-line speed any edge allows at base time.
///
/// Multipliers never drop below 1.0, so no edge is ever traversed faster
/// than this, whatever its condition or traffic. Great-circle distance
/// divided by this speed therefore never overestimates remaining time.
fn heuristic_speed_bound(nodes: &[Node], edges: &[EdgeGeometry]) -> f64 {
    edges
        .iter()
        .filter_map(|edge| {
            let km = haversine_km(nodes[edge.from].location, nodes[edge.to].location);
            if km <= 0.0 {
                return None;
            }
            if edge.base_time_h <= 0.0 {
                return Some(f64::INFINITY);
            }
            Some(km / edge.base_time_h)
        })
        .fold(0.0, f64::max)
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable view of the network at one version.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    version: u64,
    topology: Arc<Topology>,
    states: Arc<[EdgeState]>,
}

impl GraphSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node_count(&self) -> usize {
        self.topology.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.topology.edges.len()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.node_index(id).map(|ix| &self.topology.nodes[ix])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.topology.nodes.iter()
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.topology.node_index.contains_key(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<Edge> {
        let geometry = self.topology.edges.get(id.index())?;
        let state = self.states[id.index()];
        Some(Edge {
            id,
            from: self.topology.nodes[geometry.from].id.clone(),
            to: self.topology.nodes[geometry.to].id.clone(),
            distance_km: geometry.distance_km,
            base_time_h: geometry.base_time_h,
            condition: state.condition,
            traffic: state.traffic,
        })
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.edge_count()).filter_map(|ix| self.edge(EdgeId(ix as u32)))
    }

    /// Directed edge from `from` to `to`, if the network has one.
    pub fn edge_between(&self, from: &NodeId, to: &NodeId) -> Option<EdgeId> {
        let a = self.node_index(from)?;
        let b = self.node_index(to)?;
        self.topology.edge_lookup.get(&(a, b)).copied()
    }

    pub fn effective_time_h(&self, id: EdgeId) -> Option<f64> {
        let geometry = self.topology.edges.get(id.index())?;
        let state = self.states[id.index()];
        Some(effective_time(geometry.base_time_h, state.condition, state.traffic))
    }

    pub fn condition(&self, id: EdgeId) -> Option<RoadCondition> {
        self.states.get(id.index()).map(|state| state.condition)
    }

    pub fn traffic(&self, id: EdgeId) -> Option<TrafficLevel> {
        self.states.get(id.index()).map(|state| state.traffic)
    }

    /// Speed bound used by the A* heuristic (km/h). Infinite or zero when the
    /// network geometry gives no usable bound.
    pub fn heuristic_speed_kmh(&self) -> f64 {
        self.topology.heuristic_speed_kmh
    }

    /// Exports the snapshot as a definition that restores this exact version,
    /// edge ids and conditions.
    pub fn to_definition(&self) -> NetworkDefinition {
        let nodes = self
            .topology
            .nodes
            .iter()
            .map(|node| NodeDefinition {
                id: node.id.clone(),
                name: node.name.clone(),
                lat: node.location.0,
                lng: node.location.1,
                kind: node.kind,
            })
            .collect();

        let roads = self
            .edges()
            .map(|edge| RoadDefinition {
                from: edge.from,
                to: edge.to,
                distance_km: edge.distance_km,
                time_h: Some(edge.base_time_h),
                bidirectional: false,
                condition: Some(edge.condition),
                traffic: Some(edge.traffic),
            })
            .collect();

        NetworkDefinition {
            version: self.version,
            nodes,
            roads,
        }
    }

    // Index-level access for the search algorithms.

    pub(crate) fn node_index(&self, id: &NodeId) -> Option<usize> {
        self.topology.node_index.get(id).copied()
    }

    pub(crate) fn node_at(&self, ix: usize) -> &Node {
        &self.topology.nodes[ix]
    }

    pub(crate) fn outgoing(&self, ix: usize) -> &[EdgeId] {
        &self.topology.outgoing[ix]
    }

    pub(crate) fn endpoints(&self, id: EdgeId) -> (usize, usize) {
        let geometry = &self.topology.edges[id.index()];
        (geometry.from, geometry.to)
    }

    pub(crate) fn distance_km(&self, id: EdgeId) -> f64 {
        self.topology.edges[id.index()].distance_km
    }

    /// Builds `version` with the updates applied, or returns the first edge
    /// id that does not exist.
    fn with_updates(
        &self,
        updates: &[ConditionUpdate],
        version: u64,
    ) -> std::result::Result<GraphSnapshot, EdgeId> {
        if let Some(missing) = updates.iter().find(|u| u.edge.index() >= self.edge_count()) {
            return Err(missing.edge);
        }

        let mut states = self.states.to_vec();
        for update in updates {
            let state = &mut states[update.edge.index()];
            if let Some(condition) = update.condition {
                state.condition = condition;
            }
            if let Some(traffic) = update.traffic {
                state.traffic = traffic;
            }
        }

        Ok(GraphSnapshot {
            version,
            topology: Arc::clone(&self.topology),
            states: states.into(),
        })
    }
}

// ============================================================================
// Store
// ============================================================================

/// Owner of the current snapshot. Many readers, one serialized writer.
#[derive(Debug)]
pub struct GraphStore {
    current: RwLock<Arc<GraphSnapshot>>,
    writer: Mutex<()>,
}

impl GraphStore {
    pub fn from_definition(definition: &NetworkDefinition) -> Result<Self> {
        let (topology, states) = Topology::build(definition)?;
        info!(
            version = definition.version,
            nodes = topology.nodes.len(),
            edges = topology.edges.len(),
            "Graph store initialized"
        );

        let snapshot = GraphSnapshot {
            version: definition.version,
            topology: Arc::new(topology),
            states: states.into(),
        };

        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }

    pub fn current_version(&self) -> u64 {
        self.snapshot().version
    }

    /// The current snapshot. Stays valid and unchanged for as long as the
    /// caller holds it.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Applies one edge update. Fails with `NotFound` for an unknown edge.
    pub(crate) fn apply_mutation(
        &self,
        edge: EdgeId,
        condition: Option<RoadCondition>,
        traffic: Option<TrafficLevel>,
    ) -> Result<u64> {
        let update = ConditionUpdate {
            edge,
            condition,
            traffic,
        };
        self.publish(&[update], |missing| {
            EngineError::not_found(format!("edge {}", missing))
        })
    }

    /// Applies all updates as a single version bump, or none of them.
    pub(crate) fn apply_batch(&self, updates: &[ConditionUpdate]) -> Result<u64> {
        if updates.is_empty() {
            return Err(EngineError::invalid("condition batch must not be empty"));
        }
        self.publish(updates, |missing| {
            EngineError::invalid(format!("batch rejected: edge {} does not exist", missing))
        })
    }

    fn publish<F>(&self, updates: &[ConditionUpdate], missing: F) -> Result<u64>
    where
        F: FnOnce(EdgeId) -> EngineError,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.snapshot();
        let Some(version) = current.version.checked_add(1) else {
            return Err(EngineError::invalid(format!(
                "graph version {} cannot advance further",
                current.version
            )));
        };
        let next = current.with_updates(updates, version).map_err(missing)?;
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::new(next);
        }

        debug!(version, updates = updates.len(), "Published graph snapshot");
        Ok(version)
    }
}
