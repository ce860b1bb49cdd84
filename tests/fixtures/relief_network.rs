//! Relief network around lower Manhattan / Jersey City.
//!
//! Centers and zones sit at the coordinates of the sample relief data;
//! junctions are real intersections. Road lengths are great-circle distance
//! plus ~30% for street layout.

#![allow(dead_code)]

use relief_router::network::{NetworkDefinition, NodeKind};
use relief_router::resources::{DisasterZone, ReliefCenter, Resource};

/// A named site with coordinates.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: &'static str,
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Site {
    pub const fn new(id: &'static str, name: &'static str, lat: f64, lng: f64) -> Self {
        Self { id, name, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

// ============================================================================
// Sites
// ============================================================================

pub const RELIEF_CENTERS: &[Site] = &[
    Site::new("rc1", "Central Relief Hub", 40.7128, -74.0060),
    Site::new("rc2", "North Relief Station", 40.7589, -73.9851),
    Site::new("rc3", "South Relief Depot", 40.6892, -74.0445),
];

pub const DISASTER_ZONES: &[Site] = &[
    Site::new("dz1", "Flood Zone Alpha", 40.7505, -73.9934),
    Site::new("dz2", "Earthquake Zone Beta", 40.7282, -74.0776),
    Site::new("dz3", "Hurricane Zone Gamma", 40.6782, -73.9442),
    Site::new("dz4", "Fire Zone Delta", 40.7614, -73.9776),
];

pub const JUNCTIONS: &[Site] = &[
    Site::new("j_village", "West Village", 40.7336, -74.0027),
    Site::new("j_holland", "Holland Tunnel", 40.7267, -74.0111),
    Site::new("j_bkbridge", "Brooklyn Bridge", 40.7061, -73.9969),
    Site::new("j_atlantic", "Atlantic Avenue", 40.6840, -73.9770),
];

/// Bidirectional roads: (from, to, km).
pub const ROADS: &[(&str, &str, f64)] = &[
    ("rc1", "j_village", 3.03),
    ("rc1", "j_holland", 2.09),
    ("rc1", "j_bkbridge", 1.39),
    ("rc1", "rc3", 5.43),
    ("j_village", "dz1", 2.65),
    ("j_village", "j_holland", 1.36),
    ("dz1", "rc2", 1.52),
    ("rc2", "dz4", 0.90),
    ("dz1", "dz4", 2.34),
    ("j_holland", "dz2", 7.29),
    ("rc3", "dz2", 6.70),
    ("j_bkbridge", "j_atlantic", 3.87),
    ("j_atlantic", "dz3", 3.69),
];

// ============================================================================
// Builders
// ============================================================================

/// The full fixture network, every road good / light.
pub fn manhattan_network() -> NetworkDefinition {
    let mut definition = NetworkDefinition::new();
    for site in RELIEF_CENTERS {
        definition = definition.with_node(site.id, NodeKind::ReliefCenter, site.lat, site.lng);
    }
    for site in DISASTER_ZONES {
        definition = definition.with_node(site.id, NodeKind::DisasterZone, site.lat, site.lng);
    }
    for site in JUNCTIONS {
        definition = definition.with_node(site.id, NodeKind::Junction, site.lat, site.lng);
    }
    for (from, to, km) in ROADS {
        definition = definition.with_road(from, to, *km);
    }
    definition
}

/// One center and one zone joined by a single road.
pub fn spur_network() -> NetworkDefinition {
    NetworkDefinition::new()
        .with_node("rc1", NodeKind::ReliefCenter, 40.7128, -74.0060)
        .with_node("dz1", NodeKind::DisasterZone, 40.7505, -73.9934)
        .with_road("rc1", "dz1", 5.4)
}

/// Stocks of the sample relief centers.
pub fn sample_centers() -> Vec<ReliefCenter> {
    vec![
        ReliefCenter::new("rc1")
            .with_stock("food", 1000.0)
            .with_stock("water", 5000.0)
            .with_stock("medical", 200.0)
            .with_capacity(10_000.0),
        ReliefCenter::new("rc2")
            .with_stock("food", 800.0)
            .with_stock("water", 3000.0)
            .with_stock("blankets", 500.0)
            .with_capacity(8000.0),
        ReliefCenter::new("rc3")
            .with_resource(&Resource::new("medical", 300.0, "kits"))
            .with_resource(&Resource::new("blankets", 800.0, "pieces"))
            .with_resource(&Resource::new("tools", 150.0, "sets"))
            .with_capacity(6000.0),
    ]
}

/// Needs of the sample disaster zones.
pub fn sample_zones() -> Vec<DisasterZone> {
    vec![
        DisasterZone::new("dz1", 8.0)
            .with_population(5000)
            .with_need("food", 500.0)
            .with_need("water", 2000.0),
        DisasterZone::new("dz2", 6.0)
            .with_population(3000)
            .with_need("medical", 100.0)
            .with_need("blankets", 300.0),
        DisasterZone::new("dz3", 9.0)
            .with_population(8000)
            .with_need("food", 800.0)
            .with_need("water", 3000.0)
            .with_need("medical", 200.0),
        DisasterZone::new("dz4", 7.0)
            .with_population(2000)
            .with_need("medical", 80.0)
            .with_need("blankets", 200.0),
    ]
}

/// Two centers holding 10,000 and 8,000 units, two zones needing 2,500 and
/// 400.
pub fn ample_supply() -> (Vec<ReliefCenter>, Vec<DisasterZone>) {
    let centers = vec![
        ReliefCenter::new("rc1").with_stock("supplies", 10_000.0),
        ReliefCenter::new("rc2").with_stock("supplies", 8000.0),
    ];
    let zones = vec![
        DisasterZone::new("dz1", 8.0).with_need("supplies", 2500.0),
        DisasterZone::new("dz2", 6.0).with_need("supplies", 400.0),
    ];
    (centers, zones)
}
