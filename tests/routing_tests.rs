//! Path finding over the fixture network.
//!
//! Tests for Dijkstra/A* agreement, alternatives, closures, search budgets
//! and route re-evaluation.

mod fixtures;

use std::collections::HashSet;

use approx::assert_relative_eq;

use relief_router::engine::{EngineConfig, ReliefEngine};
use relief_router::error::EngineError;
use relief_router::graph::GraphStore;
use relief_router::limits::Budget;
use relief_router::network::{ConditionUpdate, EdgeId, NodeId, RoadCondition, TrafficLevel};
use relief_router::pathfinder::{
    PathAlgorithm, PathFinder, PathOptions, RouteState, RouteWeights,
};

fn all_node_ids() -> Vec<NodeId> {
    fixtures::RELIEF_CENTERS
        .iter()
        .chain(fixtures::DISASTER_ZONES)
        .chain(fixtures::JUNCTIONS)
        .map(|site| NodeId::from(site.id))
        .collect()
}

fn engine() -> ReliefEngine {
    ReliefEngine::new(&fixtures::manhattan_network(), EngineConfig::default()).unwrap()
}

// ============================================================================
// Dijkstra / A* agreement
// ============================================================================

#[test]
fn test_astar_matches_dijkstra_for_every_pair() {
    let store = GraphStore::from_definition(&fixtures::manhattan_network()).unwrap();
    let snapshot = store.snapshot();
    let finder = PathFinder::default();
    let nodes = all_node_ids();

    for origin in &nodes {
        for destination in &nodes {
            let dijkstra = finder.shortest_path(&snapshot, origin, destination).unwrap();
            let astar = finder.heuristic_path(&snapshot, origin, destination).unwrap();
            assert_relative_eq!(dijkstra.total_time_h, astar.total_time_h, epsilon = 1e-9);
            assert!(dijkstra.optimal && astar.optimal);
        }
    }
}

#[test]
fn test_astar_stays_admissible_under_mixed_conditions() {
    let engine = engine();
    let snapshot = engine.snapshot();
    let conditions = [
        RoadCondition::Excellent,
        RoadCondition::Fair,
        RoadCondition::Poor,
        RoadCondition::Damaged,
    ];
    let traffic = [
        TrafficLevel::Moderate,
        TrafficLevel::Heavy,
        TrafficLevel::Severe,
        TrafficLevel::Light,
    ];
    let updates: Vec<ConditionUpdate> = snapshot
        .edges()
        .enumerate()
        .map(|(ix, edge)| ConditionUpdate {
            edge: edge.id,
            condition: Some(conditions[ix % conditions.len()]),
            traffic: Some(traffic[(ix / 2) % traffic.len()]),
        })
        .collect();
    engine.apply_batch(&updates).unwrap();

    let snapshot = engine.snapshot();
    let finder = PathFinder::default();
    let nodes = all_node_ids();
    for origin in &nodes {
        for destination in &nodes {
            let dijkstra = finder.shortest_path(&snapshot, origin, destination).unwrap();
            let astar = finder.heuristic_path(&snapshot, origin, destination).unwrap();
            assert_relative_eq!(dijkstra.total_time_h, astar.total_time_h, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_route_through_west_village() {
    let engine = engine();
    let route = engine
        .get_shortest_path(&"rc1".into(), &"dz1".into(), PathAlgorithm::Dijkstra)
        .unwrap();

    let ids: Vec<&str> = route.waypoints.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["rc1", "j_village", "dz1"]);
    assert_relative_eq!(route.total_distance_km, 5.68, epsilon = 1e-9);
    // 50 km/h nominal, good condition (x1.2), light traffic (x1.0).
    assert_relative_eq!(route.total_time_h, 5.68 / 50.0 * 1.2, epsilon = 1e-9);
    assert_eq!(route.version, 0);
    assert!(route.geometry.length_km() <= route.total_distance_km);
}

#[test]
fn test_unknown_node_is_not_found() {
    let engine = engine();
    let err = engine
        .get_shortest_path(&"rc1".into(), &"atlantis".into(), PathAlgorithm::AStar)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }), "got {:?}", err);
}

#[test]
fn test_low_heuristic_speed_is_rejected() {
    let store = GraphStore::from_definition(&fixtures::manhattan_network()).unwrap();
    let snapshot = store.snapshot();
    let finder = PathFinder::new(PathOptions {
        heuristic_speed_kmh: Some(1.0),
        ..PathOptions::default()
    });
    let err = finder
        .heuristic_path(&snapshot, &"rc1".into(), &"dz1".into())
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput { .. }), "got {:?}", err);
}

// ============================================================================
// Alternatives
// ============================================================================

#[test]
fn test_alternatives_are_distinct_and_sorted() {
    let engine = engine();
    let shortest = engine
        .get_shortest_path(&"rc1".into(), &"dz1".into(), PathAlgorithm::Dijkstra)
        .unwrap();
    let routes = engine.get_alternatives(&"rc1".into(), &"dz1".into(), 3).unwrap();

    assert!(routes.len() >= 2, "expected at least two routes, got {}", routes.len());
    assert!(routes.len() <= 3);
    assert_relative_eq!(routes[0].total_time_h, shortest.total_time_h, epsilon = 1e-9);
    for pair in routes.windows(2) {
        assert!(pair[0].total_time_h <= pair[1].total_time_h);
        assert_ne!(pair[0].edge_sequence(), pair[1].edge_sequence());
    }
}

#[test]
fn test_zero_alternatives() {
    let engine = engine();
    let routes = engine.get_alternatives(&"rc1".into(), &"dz1".into(), 0).unwrap();
    assert!(routes.is_empty());
}

// ============================================================================
// Closures
// ============================================================================

#[test]
fn test_blocked_single_road_is_unreachable() {
    let engine = ReliefEngine::new(&fixtures::spur_network(), EngineConfig::default()).unwrap();
    engine.close_road(&"rc1".into(), &"dz1".into()).unwrap();

    for mode in [PathAlgorithm::Dijkstra, PathAlgorithm::AStar] {
        let err = engine.get_shortest_path(&"rc1".into(), &"dz1".into(), mode).unwrap_err();
        assert!(matches!(err, EngineError::Unreachable { .. }), "got {:?}", err);
    }
    let routes = engine.get_alternatives(&"rc1".into(), &"dz1".into(), 3).unwrap();
    assert!(routes.is_empty());
}

#[test]
fn test_one_direction_blocked() {
    let engine = ReliefEngine::new(&fixtures::spur_network(), EngineConfig::default()).unwrap();
    let snapshot = engine.snapshot();
    let outbound = snapshot.edge_between(&"rc1".into(), &"dz1".into()).unwrap();
    engine
        .apply_condition_update(outbound, Some(RoadCondition::Blocked), None)
        .unwrap();

    assert!(engine
        .get_shortest_path(&"rc1".into(), &"dz1".into(), PathAlgorithm::Dijkstra)
        .is_err());
    assert!(engine
        .get_shortest_path(&"dz1".into(), &"rc1".into(), PathAlgorithm::Dijkstra)
        .is_ok());
}

#[test]
fn test_route_status_reports_closure() {
    let engine = engine();
    let route = engine
        .get_shortest_path(&"rc1".into(), &"dz1".into(), PathAlgorithm::Dijkstra)
        .unwrap();

    let status = engine.route_status(&route).unwrap();
    assert_eq!(status.state, RouteState::Active);
    assert_relative_eq!(status.current_time_h.unwrap(), route.total_time_h, epsilon = 1e-12);

    engine.close_road(&"j_village".into(), &"dz1".into()).unwrap();
    let status = engine.route_status(&route).unwrap();
    assert_eq!(status.state, RouteState::Blocked);
    assert_eq!(status.version, 1);
    assert_eq!(status.blocked_segments.len(), 1);
    assert!(status.current_time_h.is_none());

    // dz1, rc2 and dz4 are only reachable through that road.
    let err = engine
        .get_shortest_path(&"rc1".into(), &"dz4".into(), PathAlgorithm::AStar)
        .unwrap_err();
    assert!(matches!(err, EngineError::Unreachable { .. }));
}

#[test]
fn test_route_status_reports_delay() {
    let engine = engine();
    let route = engine
        .get_shortest_path(&"rc1".into(), &"dz1".into(), PathAlgorithm::Dijkstra)
        .unwrap();
    let edges: Vec<EdgeId> = route.edge_sequence();
    let updates: Vec<ConditionUpdate> = edges
        .iter()
        .map(|&edge| ConditionUpdate::traffic(edge, TrafficLevel::Heavy))
        .collect();
    engine.apply_batch(&updates).unwrap();

    let status = engine.route_status(&route).unwrap();
    assert_relative_eq!(status.delay_factor, 1.2 * 1.8, epsilon = 1e-12);
    assert_relative_eq!(status.current_time_h.unwrap(), route.total_time_h * 1.8, epsilon = 1e-9);
}

// ============================================================================
// Budgets
// ============================================================================

#[test]
fn test_expansion_budget_returns_tentative_path() {
    let store = GraphStore::from_definition(&fixtures::manhattan_network()).unwrap();
    let snapshot = store.snapshot();
    let finder = PathFinder::new(PathOptions {
        limits: Budget::iterations(1),
        ..PathOptions::default()
    });

    // One expansion settles rc1 and discovers its neighbours.
    let route = finder
        .shortest_path(&snapshot, &"rc1".into(), &"j_holland".into())
        .unwrap();
    assert!(!route.optimal);
    assert_eq!(route.waypoints.len(), 2);

    let err = finder
        .shortest_path(&snapshot, &"rc1".into(), &"dz3".into())
        .unwrap_err();
    assert!(matches!(err, EngineError::Unreachable { .. }));
}

// ============================================================================
// Avoided nodes / weighted routes
// ============================================================================

#[test]
fn test_avoiding_holland_tunnel_goes_through_south_depot() {
    let engine = engine();
    let avoid: HashSet<NodeId> = [NodeId::from("j_holland")].into_iter().collect();

    let direct = engine
        .get_shortest_path(&"rc1".into(), &"dz2".into(), PathAlgorithm::Dijkstra)
        .unwrap();
    assert!(direct.waypoints.contains(&"j_holland".into()));

    for mode in [PathAlgorithm::Dijkstra, PathAlgorithm::AStar] {
        let detour = engine
            .get_path_avoiding(&"rc1".into(), &"dz2".into(), mode, &avoid)
            .unwrap();
        let ids: Vec<&str> = detour.waypoints.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["rc1", "rc3", "dz2"]);
        assert_relative_eq!(detour.total_distance_km, 5.43 + 6.70, epsilon = 1e-9);
        assert!(detour.total_time_h > direct.total_time_h);
    }
}

#[test]
fn test_avoiding_only_access_is_unreachable() {
    let engine = engine();
    let avoid: HashSet<NodeId> = [NodeId::from("j_village")].into_iter().collect();
    let err = engine
        .get_path_avoiding(&"rc1".into(), &"dz1".into(), PathAlgorithm::Dijkstra, &avoid)
        .unwrap_err();
    assert!(matches!(err, EngineError::Unreachable { .. }), "got {:?}", err);
}

#[test]
fn test_weighted_route_defaults_follow_fastest_path() {
    let engine = engine();
    let fastest = engine
        .get_shortest_path(&"rc1".into(), &"dz1".into(), PathAlgorithm::Dijkstra)
        .unwrap();
    let weighted = engine
        .get_weighted_path(&"rc1".into(), &"dz1".into(), &RouteWeights::default(), &HashSet::new())
        .unwrap();

    // Good / light roads: every blend term grows with distance or hop count.
    assert_eq!(weighted.route.edge_sequence(), fastest.edge_sequence());
    let expected = fastest.total_time_h
        + 0.5 * fastest.total_distance_km
        + 0.3 * 1.2 * fastest.segments.len() as f64;
    assert_relative_eq!(weighted.total_weight, expected, epsilon = 1e-9);
    assert_eq!(weighted.weights, RouteWeights::default());
}
