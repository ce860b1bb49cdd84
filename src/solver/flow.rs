//! Min-cost flow by successive shortest paths.
//!
//! Arc costs may be negative (demand arcs carry a reward), so each shortest
//! path is found with queue-based Bellman-Ford on the residual graph.
//! Augmentation stops once the cheapest source-to-sink path no longer has
//! negative cost, which yields the minimum-cost flow of any value.

use std::collections::VecDeque;

use tracing::warn;

#[derive(Debug, Clone)]
struct Arc {
    to: usize,
    capacity: f64,
    cost: f64,
    flow: f64,
}

impl Arc {
    fn residual(&self) -> f64 {
        self.capacity - self.flow
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FlowNetwork {
    arcs: Vec<Arc>,
    adjacency: Vec<Vec<usize>>,
    epsilon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FlowOutcome {
    pub flow: f64,
    pub cost: f64,
    pub augmentations: usize,
}

impl FlowNetwork {
    pub fn new(nodes: usize, epsilon: f64) -> Self {
        Self {
            arcs: Vec::new(),
            adjacency: vec![Vec::new(); nodes],
            epsilon,
        }
    }

    /// Adds an arc and its residual twin; returns the arc id.
    pub fn add_arc(&mut self, from: usize, to: usize, capacity: f64, cost: f64) -> usize {
        let id = self.arcs.len();
        self.arcs.push(Arc {
            to,
            capacity,
            cost,
            flow: 0.0,
        });
        self.arcs.push(Arc {
            to: from,
            capacity: 0.0,
            cost: -cost,
            flow: 0.0,
        });
        self.adjacency[from].push(id);
        self.adjacency[to].push(id + 1);
        id
    }

    pub fn flow_on(&self, arc: usize) -> f64 {
        self.arcs[arc].flow
    }

    /// Pushes flow along negative-cost paths until none is left, capped at
    /// `max_augmentations`.
    pub fn min_cost_flow(
        &mut self,
        source: usize,
        sink: usize,
        max_augmentations: usize,
    ) -> FlowOutcome {
        let mut outcome = FlowOutcome {
            flow: 0.0,
            cost: 0.0,
            augmentations: 0,
        };

        while let Some((path, path_cost)) = self.cheapest_path(source, sink) {
            if path_cost >= -self.epsilon {
                break;
            }
            if outcome.augmentations >= max_augmentations {
                warn!(
                    augmentations = outcome.augmentations,
                    "Min-cost flow hit its augmentation cap; returning current flow"
                );
                break;
            }

            let bottleneck = path
                .iter()
                .map(|&arc| self.arcs[arc].residual())
                .fold(f64::INFINITY, f64::min);
            if !bottleneck.is_finite() || bottleneck <= self.epsilon {
                break;
            }
            for &arc in &path {
                self.arcs[arc].flow += bottleneck;
                self.arcs[arc ^ 1].flow -= bottleneck;
            }
            outcome.flow += bottleneck;
            outcome.cost += bottleneck * path_cost;
            outcome.augmentations += 1;
        }
        outcome
    }

    /// Cheapest residual path as a list of arc ids, with its cost.
    fn cheapest_path(&self, source: usize, sink: usize) -> Option<(Vec<usize>, f64)> {
        let n = self.adjacency.len();
        let mut dist = vec![f64::INFINITY; n];
        let mut via = vec![usize::MAX; n];
        let mut queued = vec![false; n];
        let mut relaxations = vec![0usize; n];
        let mut queue = VecDeque::from([source]);
        dist[source] = 0.0;
        queued[source] = true;

        while let Some(node) = queue.pop_front() {
            queued[node] = false;
            for &id in &self.adjacency[node] {
                let arc = &self.arcs[id];
                if arc.residual() <= self.epsilon {
                    continue;
                }
                let candidate = dist[node] + arc.cost;
                if candidate < dist[arc.to] - self.epsilon {
                    dist[arc.to] = candidate;
                    via[arc.to] = id;
                    if !queued[arc.to] {
                        relaxations[arc.to] += 1;
                        // A node relaxed n times sits on a negative cycle,
                        // which successive shortest paths never creates.
                        if relaxations[arc.to] > n {
                            warn!("Negative cycle in residual graph; stopping augmentation");
                            return None;
                        }
                        queued[arc.to] = true;
                        queue.push_back(arc.to);
                    }
                }
            }
        }

        if !dist[sink].is_finite() {
            return None;
        }
        let mut path = Vec::new();
        let mut node = sink;
        while node != source {
            let id = via[node];
            path.push(id);
            node = self.arcs[id ^ 1].to;
        }
        path.reverse();
        Some((path, dist[sink]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_reward_pulls_flow() {
        // source(0) -> a(1) -> sink(2), reward 10 per unit, cost 3 per unit.
        let mut network = FlowNetwork::new(3, 1e-9);
        network.add_arc(0, 1, 5.0, 0.0);
        let shipped = network.add_arc(1, 2, 8.0, 3.0 - 10.0);
        let outcome = network.min_cost_flow(0, 2, 100);
        assert_eq!(outcome.flow, 5.0);
        assert_eq!(network.flow_on(shipped), 5.0);
        assert!((outcome.cost - (-35.0)).abs() < 1e-9);
    }

    #[test]
    fn test_unprofitable_path_carries_nothing() {
        let mut network = FlowNetwork::new(3, 1e-9);
        network.add_arc(0, 1, 5.0, 0.0);
        network.add_arc(1, 2, 5.0, 4.0);
        let outcome = network.min_cost_flow(0, 2, 100);
        assert_eq!(outcome.flow, 0.0);
        assert_eq!(outcome.augmentations, 0);
    }

    #[test]
    fn test_reroutes_through_residual_arc() {
        // Two sources, two sinks; greedy first path must be partly undone.
        // 0 = source, 1,2 = centers, 3,4 = zones, 5 = sink.
        let mut network = FlowNetwork::new(6, 1e-9);
        network.add_arc(0, 1, 1.0, 0.0);
        network.add_arc(0, 2, 1.0, 0.0);
        let c1z1 = network.add_arc(1, 3, f64::INFINITY, 1.0);
        let c1z2 = network.add_arc(1, 4, f64::INFINITY, 2.0);
        let c2z1 = network.add_arc(2, 3, f64::INFINITY, 2.0);
        let c2z2 = network.add_arc(2, 4, f64::INFINITY, 10.0);
        network.add_arc(3, 5, 1.0, -100.0);
        network.add_arc(4, 5, 1.0, -100.0);

        let outcome = network.min_cost_flow(0, 5, 100);
        assert_eq!(outcome.flow, 2.0);
        assert_eq!(network.flow_on(c1z1), 0.0);
        assert_eq!(network.flow_on(c1z2), 1.0);
        assert_eq!(network.flow_on(c2z1), 1.0);
        assert_eq!(network.flow_on(c2z2), 0.0);
    }
}
