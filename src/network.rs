//! Road network records.
//!
//! Nodes, directed edges and the per-direction condition attributes that
//! drive effective travel time, plus the serde-friendly `NetworkDefinition`
//! the graph store is built from (and exported back to for persistence).

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Speed assumed when a road definition carries no explicit base time.
pub const DEFAULT_NOMINAL_SPEED_KMH: f64 = 50.0;

/// Unique node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a directed edge. Stable for the lifetime of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u32);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    ReliefCenter,
    DisasterZone,
    Junction,
}

/// A network node. Immutable once the network is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// (lat, lng) in degrees.
    pub location: (f64, f64),
    pub kind: NodeKind,
}

/// Surface condition of one direction of a road.
///
/// Every multiplier is at least 1.0. A* admissibility over all
/// condition/traffic combinations depends on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadCondition {
    Excellent,
    Good,
    Fair,
    Poor,
    Damaged,
    Blocked,
}

impl RoadCondition {
    pub const ALL: [RoadCondition; 6] = [
        RoadCondition::Excellent,
        RoadCondition::Good,
        RoadCondition::Fair,
        RoadCondition::Poor,
        RoadCondition::Damaged,
        RoadCondition::Blocked,
    ];

    /// Travel-time multiplier. `Blocked` is infinite.
    pub fn multiplier(self) -> f64 {
        match self {
            RoadCondition::Excellent => 1.0,
            RoadCondition::Good => 1.2,
            RoadCondition::Fair => 1.5,
            RoadCondition::Poor => 2.0,
            RoadCondition::Damaged => 3.0,
            RoadCondition::Blocked => f64::INFINITY,
        }
    }

    pub fn is_passable(self) -> bool {
        self != RoadCondition::Blocked
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoadCondition::Excellent => "excellent",
            RoadCondition::Good => "good",
            RoadCondition::Fair => "fair",
            RoadCondition::Poor => "poor",
            RoadCondition::Damaged => "damaged",
            RoadCondition::Blocked => "blocked",
        }
    }
}

impl fmt::Display for RoadCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoadCondition {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        RoadCondition::ALL
            .into_iter()
            .find(|condition| condition.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::invalid(format!("unknown road condition '{}'", s)))
    }
}

/// Traffic level of one direction of a road.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLevel {
    Light,
    Moderate,
    Heavy,
    Severe,
}

impl TrafficLevel {
    pub const ALL: [TrafficLevel; 4] = [
        TrafficLevel::Light,
        TrafficLevel::Moderate,
        TrafficLevel::Heavy,
        TrafficLevel::Severe,
    ];

    pub fn multiplier(self) -> f64 {
        match self {
            TrafficLevel::Light => 1.0,
            TrafficLevel::Moderate => 1.3,
            TrafficLevel::Heavy => 1.8,
            TrafficLevel::Severe => 2.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrafficLevel::Light => "light",
            TrafficLevel::Moderate => "moderate",
            TrafficLevel::Heavy => "heavy",
            TrafficLevel::Severe => "severe",
        }
    }
}

impl fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        TrafficLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::invalid(format!("unknown traffic level '{}'", s)))
    }
}

/// Travel time after condition and traffic multipliers.
pub fn effective_time(base_time_h: f64, condition: RoadCondition, traffic: TrafficLevel) -> f64 {
    if !condition.is_passable() {
        return f64::INFINITY;
    }
    base_time_h * condition.multiplier() * traffic.multiplier()
}

/// A directed edge as seen in one graph snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub distance_km: f64,
    pub base_time_h: f64,
    pub condition: RoadCondition,
    pub traffic: TrafficLevel,
}

impl Edge {
    pub fn effective_time_h(&self) -> f64 {
        effective_time(self.base_time_h, self.condition, self.traffic)
    }

    pub fn is_passable(&self) -> bool {
        self.condition.is_passable()
    }
}

/// A condition-change event for one directed edge. Absent fields keep their
/// current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionUpdate {
    pub edge: EdgeId,
    #[serde(default)]
    pub condition: Option<RoadCondition>,
    #[serde(default)]
    pub traffic: Option<TrafficLevel>,
}

impl ConditionUpdate {
    pub fn condition(edge: EdgeId, condition: RoadCondition) -> Self {
        Self {
            edge,
            condition: Some(condition),
            traffic: None,
        }
    }

    pub fn traffic(edge: EdgeId, traffic: TrafficLevel) -> Self {
        Self {
            edge,
            condition: None,
            traffic: Some(traffic),
        }
    }
}

// ============================================================================
// Network definition
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub kind: NodeKind,
}

/// A road between two nodes. Bidirectional roads expand into two directed
/// edges whose conditions evolve independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadDefinition {
    pub from: NodeId,
    pub to: NodeId,
    pub distance_km: f64,
    /// Base traversal time; defaults to distance at the nominal speed.
    #[serde(default)]
    pub time_h: Option<f64>,
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
    #[serde(default)]
    pub condition: Option<RoadCondition>,
    #[serde(default)]
    pub traffic: Option<TrafficLevel>,
}

fn default_bidirectional() -> bool {
    true
}

impl RoadDefinition {
    pub fn base_time_h(&self) -> f64 {
        self.time_h
            .unwrap_or(self.distance_km / DEFAULT_NOMINAL_SPEED_KMH)
    }
}

/// Initial (or persisted) network layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    /// Version to resume from when restoring a persisted snapshot.
    #[serde(default)]
    pub version: u64,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub roads: Vec<RoadDefinition>,
}

impl NetworkDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, id: &str, kind: NodeKind, lat: f64, lng: f64) -> Self {
        self.nodes.push(NodeDefinition {
            id: NodeId::new(id),
            name: id.to_string(),
            lat,
            lng,
            kind,
        });
        self
    }

    /// Adds a bidirectional road with the default (good/light) state.
    pub fn with_road(mut self, from: &str, to: &str, distance_km: f64) -> Self {
        self.roads.push(RoadDefinition {
            from: NodeId::new(from),
            to: NodeId::new(to),
            distance_km,
            time_h: None,
            bidirectional: true,
            condition: None,
            traffic: None,
        });
        self
    }

    /// Adds a one-way road.
    pub fn with_one_way(mut self, from: &str, to: &str, distance_km: f64) -> Self {
        self.roads.push(RoadDefinition {
            from: NodeId::new(from),
            to: NodeId::new(to),
            distance_km,
            time_h: None,
            bidirectional: false,
            condition: None,
            traffic: None,
        });
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipliers_never_speed_up_travel() {
        for condition in RoadCondition::ALL {
            assert!(condition.multiplier() >= 1.0, "{} must not shorten travel time", condition);
        }
        for traffic in TrafficLevel::ALL {
            assert!(traffic.multiplier() >= 1.0, "{} must not shorten travel time", traffic);
        }
    }

    #[test]
    fn test_effective_time() {
        let time = effective_time(2.0, RoadCondition::Poor, TrafficLevel::Heavy);
        assert!((time - 2.0 * 2.0 * 1.8).abs() < 1e-12);
        assert!(effective_time(2.0, RoadCondition::Blocked, TrafficLevel::Light).is_infinite());
    }

    #[test]
    fn test_parse_condition_and_traffic() {
        assert_eq!("Damaged".parse::<RoadCondition>().unwrap(), RoadCondition::Damaged);
        assert_eq!(" severe ".parse::<TrafficLevel>().unwrap(), TrafficLevel::Severe);
        assert!("flooded".parse::<RoadCondition>().is_err());
    }

    #[test]
    fn test_definition_json_defaults() {
        let json = r#"{
            "nodes": [
                {"id": "a", "lat": 40.0, "lng": -74.0, "kind": "relief_center"},
                {"id": "b", "lat": 40.1, "lng": -74.0, "kind": "junction"}
            ],
            "roads": [{"from": "a", "to": "b", "distance_km": 25.0}]
        }"#;
        let def = NetworkDefinition::from_json_str(json).unwrap();
        assert_eq!(def.version, 0);
        let road = &def.roads[0];
        assert!(road.bidirectional, "roads default to bidirectional");
        assert!((road.base_time_h() - 0.5).abs() < 1e-12, "25 km at 50 km/h is half an hour");
    }
}
