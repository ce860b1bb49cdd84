//! Shortest paths over a graph snapshot.
//!
//! Dijkstra is the baseline. A* uses great-circle distance divided by the
//! snapshot's speed bound as its heuristic, which never overestimates the
//! remaining effective time, so both return the same optimal cost.
//! Alternatives come from re-running Dijkstra with the edges of every path
//! found so far penalized.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::graph::GraphSnapshot;
use crate::haversine::haversine_km;
use crate::limits::{Budget, StopReason};
use crate::network::{EdgeId, NodeId, RoadCondition, TrafficLevel};
use crate::polyline::Polyline;
use crate::traits::Leg;

/// Node expansions between wall-clock checks (2^8).
const CLOCK_CHECK_MASK: u64 = 0xFF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathAlgorithm {
    #[default]
    Dijkstra,
    AStar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathOptions {
    /// Speed used by the A* heuristic. Defaults to the snapshot's bound; a
    /// value below that bound is rejected as inadmissible.
    pub heuristic_speed_kmh: Option<f64>,
    /// Factor applied to the edges of each found path before searching for
    /// the next alternative.
    pub alternative_penalty: f64,
    /// Reruns allowed per requested alternative.
    pub max_alternative_rounds_per_path: usize,
    /// Cap on node expansions / wall time per search.
    pub limits: Budget,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            heuristic_speed_kmh: None,
            alternative_penalty: 1.5,
            max_alternative_rounds_per_path: 3,
            limits: Budget::unlimited(),
        }
    }
}

/// Per-objective coefficients for a blended route cost. An edge costs
/// `time * hours + distance * km + condition * (condition x traffic
/// multiplier)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteWeights {
    pub time: f64,
    pub distance: f64,
    pub condition: f64,
}

impl Default for RouteWeights {
    fn default() -> Self {
        Self {
            time: 1.0,
            distance: 0.5,
            condition: 0.3,
        }
    }
}

impl RouteWeights {
    /// Blended cost of one edge, infinite while it is blocked.
    pub fn edge_cost(&self, snapshot: &GraphSnapshot, edge: EdgeId) -> f64 {
        let Some(edge) = snapshot.edge(edge) else {
            return f64::INFINITY;
        };
        if !edge.is_passable() {
            return f64::INFINITY;
        }
        self.time * edge.effective_time_h()
            + self.distance * edge.distance_km
            + self.condition * edge.condition.multiplier() * edge.traffic.multiplier()
    }

    fn validate(&self) -> Result<()> {
        let valid = [self.time, self.distance, self.condition]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0);
        if valid {
            Ok(())
        } else {
            Err(EngineError::invalid(format!(
                "route weights must be finite and non-negative, got {:?}",
                self
            )))
        }
    }
}

/// A route chosen by blended cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRoute {
    pub route: RouteResult,
    /// Sum of the blended edge costs along the route.
    pub total_weight: f64,
    pub weights: RouteWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub edge: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub distance_km: f64,
    pub effective_time_h: f64,
    pub condition: RoadCondition,
    pub traffic: TrafficLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub origin: NodeId,
    pub destination: NodeId,
    pub waypoints: Vec<NodeId>,
    pub segments: Vec<RouteSegment>,
    pub total_distance_km: f64,
    pub total_time_h: f64,
    /// Graph version the route was computed against.
    pub version: u64,
    pub algorithm: PathAlgorithm,
    /// False when the search budget ran out before the route was proven
    /// optimal.
    pub optimal: bool,
    pub geometry: Polyline,
}

impl RouteResult {
    pub fn edge_sequence(&self) -> Vec<EdgeId> {
        self.segments.iter().map(|segment| segment.edge).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Active,
    Blocked,
}

/// A previously computed route re-read against a (newer) snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStatus {
    pub version: u64,
    pub state: RouteState,
    pub blocked_segments: Vec<EdgeId>,
    /// Current travel time; `None` while any segment is blocked.
    pub current_time_h: Option<f64>,
    /// Mean condition × traffic multiplier over passable segments.
    pub delay_factor: f64,
}

// ============================================================================
// Search core
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    priority: f64,
    cost: f64,
    node: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Reversed so the max-heap pops the smallest priority first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.cost.total_cmp(&self.cost))
            .then_with(|| other.node.cmp(&self.node))
    }
}

#[derive(Debug, Clone, Copy)]
enum Heuristic {
    Zero,
    GreatCircle { target: (f64, f64), speed_kmh: f64 },
}

impl Heuristic {
    fn estimate(&self, snapshot: &GraphSnapshot, node: usize) -> f64 {
        match *self {
            Heuristic::Zero => 0.0,
            Heuristic::GreatCircle { target, speed_kmh } => {
                haversine_km(snapshot.node_at(node).location, target) / speed_kmh
            }
        }
    }
}

struct Search {
    cost: Vec<f64>,
    parent: Vec<Option<EdgeId>>,
    /// Nodes in the order they were settled.
    settled_order: Vec<usize>,
    target_settled: bool,
    expansions: usize,
    stop: Option<StopReason>,
}

impl Search {
    fn reached(&self, node: usize) -> bool {
        self.cost[node].is_finite()
    }

    fn edges_to(&self, snapshot: &GraphSnapshot, node: usize) -> Vec<EdgeId> {
        let mut edges = Vec::new();
        let mut current = node;
        while let Some(edge) = self.parent[current] {
            edges.push(edge);
            current = snapshot.endpoints(edge).0;
        }
        edges.reverse();
        edges
    }
}

fn run_search<W>(
    snapshot: &GraphSnapshot,
    source: usize,
    target: Option<usize>,
    heuristic: Heuristic,
    limits: &Budget,
    weight: W,
) -> Search
where
    W: Fn(EdgeId) -> f64,
{
    let n = snapshot.node_count();
    let mut search = Search {
        cost: vec![f64::INFINITY; n],
        parent: vec![None; n],
        settled_order: Vec::new(),
        target_settled: false,
        expansions: 0,
        stop: None,
    };
    let mut settled = vec![false; n];
    let mut frontier = BinaryHeap::new();
    let mut clock = limits.start_with_clock_mask(CLOCK_CHECK_MASK);

    search.cost[source] = 0.0;
    frontier.push(QueueEntry {
        priority: heuristic.estimate(snapshot, source),
        cost: 0.0,
        node: source,
    });

    if let Some(reason) = clock.allows_start() {
        search.stop = Some(reason);
        return search;
    }

    while let Some(QueueEntry { cost, node, .. }) = frontier.pop() {
        if settled[node] || cost > search.cost[node] {
            continue;
        }
        settled[node] = true;
        search.settled_order.push(node);

        if Some(node) == target {
            search.target_settled = true;
            break;
        }

        for &edge in snapshot.outgoing(node) {
            let w = weight(edge);
            if !w.is_finite() {
                continue;
            }
            let (_, next) = snapshot.endpoints(edge);
            if settled[next] {
                continue;
            }
            let candidate = cost + w;
            if candidate < search.cost[next] {
                search.cost[next] = candidate;
                search.parent[next] = Some(edge);
                frontier.push(QueueEntry {
                    priority: candidate + heuristic.estimate(snapshot, next),
                    cost: candidate,
                    node: next,
                });
            }
        }

        if let Some(reason) = clock.tick() {
            search.stop = Some(reason);
            break;
        }
    }

    search.expansions = clock.ticks();
    search
}

// ============================================================================
// Path finder
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PathFinder {
    options: PathOptions,
}

impl PathFinder {
    pub fn new(options: PathOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PathOptions {
        &self.options
    }

    /// Minimum effective-time path (Dijkstra).
    pub fn shortest_path(
        &self,
        snapshot: &GraphSnapshot,
        origin: &NodeId,
        destination: &NodeId,
    ) -> Result<RouteResult> {
        self.find(snapshot, origin, destination, PathAlgorithm::Dijkstra)
    }

    /// Minimum effective-time path (A*).
    pub fn heuristic_path(
        &self,
        snapshot: &GraphSnapshot,
        origin: &NodeId,
        destination: &NodeId,
    ) -> Result<RouteResult> {
        self.find(snapshot, origin, destination, PathAlgorithm::AStar)
    }

    pub fn find(
        &self,
        snapshot: &GraphSnapshot,
        origin: &NodeId,
        destination: &NodeId,
        algorithm: PathAlgorithm,
    ) -> Result<RouteResult> {
        self.find_avoiding(snapshot, origin, destination, algorithm, &HashSet::new())
    }

    /// Like `find`, but no path enters or leaves a node in `avoid`.
    pub fn find_avoiding(
        &self,
        snapshot: &GraphSnapshot,
        origin: &NodeId,
        destination: &NodeId,
        algorithm: PathAlgorithm,
        avoid: &HashSet<NodeId>,
    ) -> Result<RouteResult> {
        let source = resolve(snapshot, origin)?;
        let target = resolve(snapshot, destination)?;
        let excluded = excluded_nodes(snapshot, source, target, avoid)?;
        if source == target {
            return Ok(zero_route(snapshot, source, algorithm));
        }

        let heuristic = match algorithm {
            PathAlgorithm::Dijkstra => Heuristic::Zero,
            PathAlgorithm::AStar => self.heuristic_for(snapshot, target)?,
        };
        let search = run_search(
            snapshot,
            source,
            Some(target),
            heuristic,
            &self.options.limits,
            |edge| {
                if enters_excluded(snapshot, &excluded, edge) {
                    return f64::INFINITY;
                }
                snapshot.effective_time_h(edge).unwrap_or(f64::INFINITY)
            },
        );

        debug!(
            %origin,
            %destination,
            ?algorithm,
            avoided = avoid.len(),
            expansions = search.expansions,
            version = snapshot.version(),
            "Path search finished"
        );

        let (edges, optimal) = settle_route(&search, snapshot, origin, destination, target)?;
        Ok(build_route(snapshot, source, &edges, algorithm, optimal))
    }

    /// Minimum blended-cost path (Dijkstra), skipping nodes in `avoid`.
    pub fn weighted_path(
        &self,
        snapshot: &GraphSnapshot,
        origin: &NodeId,
        destination: &NodeId,
        weights: &RouteWeights,
        avoid: &HashSet<NodeId>,
    ) -> Result<WeightedRoute> {
        weights.validate()?;
        let source = resolve(snapshot, origin)?;
        let target = resolve(snapshot, destination)?;
        let excluded = excluded_nodes(snapshot, source, target, avoid)?;
        if source == target {
            return Ok(WeightedRoute {
                route: zero_route(snapshot, source, PathAlgorithm::Dijkstra),
                total_weight: 0.0,
                weights: *weights,
            });
        }

        let search = run_search(
            snapshot,
            source,
            Some(target),
            Heuristic::Zero,
            &self.options.limits,
            |edge| {
                if enters_excluded(snapshot, &excluded, edge) {
                    return f64::INFINITY;
                }
                weights.edge_cost(snapshot, edge)
            },
        );
        debug!(
            %origin,
            %destination,
            ?weights,
            expansions = search.expansions,
            "Weighted path search finished"
        );

        let (edges, optimal) = settle_route(&search, snapshot, origin, destination, target)?;
        Ok(WeightedRoute {
            route: build_route(snapshot, source, &edges, PathAlgorithm::Dijkstra, optimal),
            total_weight: search.cost[target],
            weights: *weights,
        })
    }

    /// Up to `k` distinct paths ordered by increasing total effective time.
    pub fn alternative_paths(
        &self,
        snapshot: &GraphSnapshot,
        origin: &NodeId,
        destination: &NodeId,
        k: usize,
    ) -> Result<Vec<RouteResult>> {
        let source = resolve(snapshot, origin)?;
        let target = resolve(snapshot, destination)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        if source == target {
            return Ok(vec![zero_route(snapshot, source, PathAlgorithm::Dijkstra)]);
        }

        let penalty_factor = self.options.alternative_penalty.max(1.0 + f64::EPSILON);
        let max_rounds = k.saturating_mul(self.options.max_alternative_rounds_per_path.max(1));
        // No simple path through unpenalized edges costs more than this.
        let ceiling: f64 = snapshot
            .edges()
            .map(|edge| edge.effective_time_h())
            .filter(|time| time.is_finite())
            .sum();
        let mut penalties: HashMap<EdgeId, f64> = HashMap::new();
        let mut seen: HashSet<Vec<EdgeId>> = HashSet::new();
        let mut routes = Vec::new();

        for _ in 0..max_rounds {
            if routes.len() >= k {
                break;
            }
            let search = run_search(
                snapshot,
                source,
                Some(target),
                Heuristic::Zero,
                &self.options.limits,
                |edge| {
                    let base = snapshot.effective_time_h(edge).unwrap_or(f64::INFINITY);
                    base * penalties.get(&edge).copied().unwrap_or(1.0)
                },
            );
            if !search.reached(target) {
                break;
            }

            let edges = search.edges_to(snapshot, target);
            let repeated = !seen.insert(edges.clone());
            for edge in &edges {
                let penalty = penalties.entry(*edge).or_insert(1.0);
                *penalty *= penalty_factor;
                if repeated {
                    // A path found twice is priced above any detour.
                    let base = snapshot.effective_time_h(*edge).unwrap_or(0.0);
                    if base > 0.0 {
                        *penalty = penalty.max(ceiling / base * penalty_factor);
                    }
                }
            }
            if !repeated {
                let optimal = routes.is_empty() && search.target_settled;
                routes.push(build_route(
                    snapshot,
                    source,
                    &edges,
                    PathAlgorithm::Dijkstra,
                    optimal,
                ));
            }
        }

        routes.sort_by(|a, b| a.total_time_h.total_cmp(&b.total_time_h));
        debug!(%origin, %destination, requested = k, found = routes.len(), "Alternative paths");
        Ok(routes)
    }

    /// Time and distance of the fastest path from `origin` to every node,
    /// indexed like the snapshot's nodes. `None` for unreachable nodes.
    pub fn shortest_legs_from(
        &self,
        snapshot: &GraphSnapshot,
        origin: &NodeId,
    ) -> Result<Vec<Option<Leg>>> {
        let source = resolve(snapshot, origin)?;
        let search = run_search(
            snapshot,
            source,
            None,
            Heuristic::Zero,
            &self.options.limits,
            |edge| snapshot.effective_time_h(edge).unwrap_or(f64::INFINITY),
        );

        let mut distance = vec![f64::INFINITY; snapshot.node_count()];
        distance[source] = 0.0;
        // Parents of tentative nodes are always settled, so settled order
        // followed by the remaining reached nodes respects parent order.
        let tentative = (0..snapshot.node_count())
            .filter(|&ix| search.reached(ix) && search.parent[ix].is_some());
        for node in search.settled_order.iter().copied().chain(tentative) {
            if let Some(edge) = search.parent[node] {
                let (from, _) = snapshot.endpoints(edge);
                distance[node] = distance[from] + snapshot.distance_km(edge);
            }
        }

        Ok((0..snapshot.node_count())
            .map(|ix| {
                search.reached(ix).then(|| Leg {
                    time_h: search.cost[ix],
                    distance_km: distance[ix],
                })
            })
            .collect())
    }

    /// Re-reads a route's segments against `snapshot`.
    pub fn reevaluate(&self, snapshot: &GraphSnapshot, route: &RouteResult) -> Result<RouteStatus> {
        let mut blocked_segments = Vec::new();
        let mut total = 0.0;
        let mut factor_sum = 0.0;
        let mut passable = 0usize;

        for segment in &route.segments {
            let edge = snapshot
                .edge(segment.edge)
                .ok_or_else(|| EngineError::not_found(format!("edge {}", segment.edge)))?;
            if edge.is_passable() {
                total += edge.effective_time_h();
                factor_sum += edge.condition.multiplier() * edge.traffic.multiplier();
                passable += 1;
            } else {
                blocked_segments.push(edge.id);
            }
        }

        let blocked = !blocked_segments.is_empty();
        Ok(RouteStatus {
            version: snapshot.version(),
            state: if blocked { RouteState::Blocked } else { RouteState::Active },
            blocked_segments,
            current_time_h: (!blocked).then_some(total),
            delay_factor: if passable == 0 { 1.0 } else { factor_sum / passable as f64 },
        })
    }

    fn heuristic_for(&self, snapshot: &GraphSnapshot, target: usize) -> Result<Heuristic> {
        let bound = snapshot.heuristic_speed_kmh();
        let speed_kmh = match self.options.heuristic_speed_kmh {
            Some(speed) if speed.is_finite() && speed > 0.0 && speed >= bound => speed,
            Some(speed) => {
                return Err(EngineError::invalid(format!(
                    "heuristic speed {} km/h is below the network bound {} km/h",
                    speed, bound
                )));
            }
            None => bound,
        };

        if !(speed_kmh.is_finite() && speed_kmh > 0.0) {
            if snapshot.edge_count() > 0 && speed_kmh.is_infinite() {
                warn!(
                    version = snapshot.version(),
                    "Zero-time edge leaves no speed bound; A* runs without heuristic"
                );
            }
            return Ok(Heuristic::Zero);
        }

        Ok(Heuristic::GreatCircle {
            target: snapshot.node_at(target).location,
            speed_kmh,
        })
    }
}

fn resolve(snapshot: &GraphSnapshot, id: &NodeId) -> Result<usize> {
    snapshot
        .node_index(id)
        .ok_or_else(|| EngineError::not_found(format!("node \"{}\"", id)))
}

/// Index mask of avoided nodes. The endpoints themselves cannot be avoided.
fn excluded_nodes(
    snapshot: &GraphSnapshot,
    source: usize,
    target: usize,
    avoid: &HashSet<NodeId>,
) -> Result<Vec<bool>> {
    let mut excluded = vec![false; snapshot.node_count()];
    for id in avoid {
        let ix = resolve(snapshot, id)?;
        if ix == source || ix == target {
            return Err(EngineError::invalid(format!(
                "cannot avoid route endpoint \"{}\"",
                id
            )));
        }
        excluded[ix] = true;
    }
    Ok(excluded)
}

fn enters_excluded(snapshot: &GraphSnapshot, excluded: &[bool], edge: EdgeId) -> bool {
    let (from, to) = snapshot.endpoints(edge);
    excluded[from] || excluded[to]
}

/// Edges to `target` and whether they are proven optimal, or `Unreachable`
/// when the search never reached it.
fn settle_route(
    search: &Search,
    snapshot: &GraphSnapshot,
    origin: &NodeId,
    destination: &NodeId,
    target: usize,
) -> Result<(Vec<EdgeId>, bool)> {
    if !search.reached(target) {
        if let Some(reason) = search.stop {
            warn!(
                %origin,
                %destination,
                ?reason,
                "Search budget exhausted before reaching destination"
            );
        }
        return Err(EngineError::unreachable(origin.as_str(), destination.as_str()));
    }
    if let Some(reason) = search.stop.filter(|_| !search.target_settled) {
        warn!(%origin, %destination, ?reason, "Returning best tentative path");
    }
    Ok((search.edges_to(snapshot, target), search.target_settled))
}

fn zero_route(snapshot: &GraphSnapshot, node: usize, algorithm: PathAlgorithm) -> RouteResult {
    let node = snapshot.node_at(node);
    RouteResult {
        origin: node.id.clone(),
        destination: node.id.clone(),
        waypoints: vec![node.id.clone()],
        segments: Vec::new(),
        total_distance_km: 0.0,
        total_time_h: 0.0,
        version: snapshot.version(),
        algorithm,
        optimal: true,
        geometry: Polyline::new(vec![node.location]),
    }
}

fn build_route(
    snapshot: &GraphSnapshot,
    source: usize,
    edges: &[EdgeId],
    algorithm: PathAlgorithm,
    optimal: bool,
) -> RouteResult {
    let origin = snapshot.node_at(source);
    let mut waypoints = vec![origin.id.clone()];
    let mut points = vec![origin.location];
    let mut segments = Vec::with_capacity(edges.len());

    for &id in edges {
        if let Some(edge) = snapshot.edge(id) {
            let (_, to) = snapshot.endpoints(id);
            let next = snapshot.node_at(to);
            waypoints.push(next.id.clone());
            points.push(next.location);
            segments.push(RouteSegment {
                edge: id,
                distance_km: edge.distance_km,
                effective_time_h: edge.effective_time_h(),
                condition: edge.condition,
                traffic: edge.traffic,
                from: edge.from,
                to: edge.to,
            });
        }
    }

    let total_distance_km = segments.iter().map(|s| s.distance_km).sum();
    let total_time_h = segments.iter().map(|s| s.effective_time_h).sum();
    let destination = waypoints.last().cloned().unwrap_or_else(|| origin.id.clone());

    RouteResult {
        origin: origin.id.clone(),
        destination,
        waypoints,
        segments,
        total_distance_km,
        total_time_h,
        version: snapshot.version(),
        algorithm,
        optimal,
        geometry: Polyline::new(points),
    }
}
