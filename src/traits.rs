//! Seams between the routing core and the allocation layers.
//!
//! The allocation solver and the metaheuristics only need per-unit transport
//! costs between supply and demand nodes. Where those come from (network
//! search, straight-line estimate) is pluggable.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::GraphSnapshot;
use crate::network::NodeId;

/// Travel figures for one origin/destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub time_h: f64,
    pub distance_km: f64,
}

/// Which leg figure is charged per shipped unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMetric {
    #[default]
    Time,
    Distance,
}

impl CostMetric {
    pub fn cost(self, leg: &Leg) -> f64 {
        match self {
            CostMetric::Time => leg.time_h,
            CostMetric::Distance => leg.distance_km,
        }
    }
}

/// Provides a leg table for a set of origins and destinations.
///
/// The table is indexed `[origin][destination]` in the order given; `None`
/// marks an unreachable pair.
pub trait TransportCostProvider: Sync {
    fn legs_for(
        &self,
        snapshot: &GraphSnapshot,
        origins: &[NodeId],
        destinations: &[NodeId],
    ) -> Result<Vec<Vec<Option<Leg>>>>;
}
