//! Route geometry as a sequence of (lat, lng) points.
//!
//! Encoding to a compact wire format is the caller's concern; inside the
//! engine a route's geometry is just its waypoint coordinates.

use serde::{Deserialize, Serialize};

use crate::haversine::haversine_km;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn into_points(self) -> Vec<(f64, f64)> {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Straight-line length through all points. A lower bound on the road
    /// distance of the route it was built from.
    pub fn length_km(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine_km(pair[0], pair[1]))
            .sum()
    }
}
