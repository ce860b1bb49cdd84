//! Great-circle distance and the straight-line transport cost provider.
//!
//! `haversine_km` also backs the A* heuristic. `HaversineCosts` estimates
//! legs from straight-line distance at an assumed speed; it ignores roads and
//! closures, so it is only a fallback for quick what-if allocation.

use crate::error::{EngineError, Result};
use crate::graph::GraphSnapshot;
use crate::network::{DEFAULT_NOMINAL_SPEED_KMH, NodeId};
use crate::traits::{Leg, TransportCostProvider};

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lng) points in kilometers.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Straight-line transport cost provider.
#[derive(Debug, Clone)]
pub struct HaversineCosts {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineCosts {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_NOMINAL_SPEED_KMH,
        }
    }
}

impl HaversineCosts {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    fn leg(&self, from: (f64, f64), to: (f64, f64)) -> Leg {
        let km = haversine_km(from, to);
        Leg {
            time_h: km / self.speed_kmh,
            distance_km: km,
        }
    }
}

impl TransportCostProvider for HaversineCosts {
    fn legs_for(
        &self,
        snapshot: &GraphSnapshot,
        origins: &[NodeId],
        destinations: &[NodeId],
    ) -> Result<Vec<Vec<Option<Leg>>>> {
        if !(self.speed_kmh.is_finite() && self.speed_kmh > 0.0) {
            return Err(EngineError::invalid(format!(
                "haversine speed must be positive, got {}",
                self.speed_kmh
            )));
        }

        let locate = |id: &NodeId| {
            snapshot
                .node(id)
                .map(|node| node.location)
                .ok_or_else(|| EngineError::not_found(format!("node \"{}\"", id)))
        };
        let targets = destinations.iter().map(locate).collect::<Result<Vec<_>>>()?;

        origins
            .iter()
            .map(|origin| {
                let from = locate(origin)?;
                Ok(targets.iter().map(|to| Some(self.leg(from, *to))).collect())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        let dist = haversine_km((40.7128, -74.0060), (40.7128, -74.0060));
        assert!(dist < 0.001, "Same point should have ~0 distance");
    }

    #[test]
    fn test_haversine_known_distance() {
        // Lower Manhattan (40.7128, -74.0060) to Philadelphia (39.9526, -75.1652)
        // Actual distance ~130 km
        let dist = haversine_km((40.7128, -74.0060), (39.9526, -75.1652));
        assert!(dist > 120.0 && dist < 140.0, "NYC to Philadelphia should be ~130km, got {}", dist);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = (40.7505, -73.9934);
        let b = (40.7282, -74.0776);
        assert!(
            (haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9,
            "Distance should be symmetric"
        );
    }

    #[test]
    fn test_reasonable_travel_time() {
        let provider = HaversineCosts::new(40.0);
        // 1 degree of latitude is ~111 km; at 40 km/h that is ~2.78 hours
        let leg = provider.leg((40.0, -74.0), (41.0, -74.0));
        assert!((leg.distance_km - 111.19).abs() < 0.5);
        assert!((leg.time_h - leg.distance_km / 40.0).abs() < 1e-12);
    }
}
