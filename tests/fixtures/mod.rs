//! Test fixtures for relief-router.
//!
//! Provides a realistic relief network including:
//! - Relief centers, disaster zones and junctions around lower Manhattan
//! - Builders for networks, center stocks and zone needs

pub mod relief_network;

pub use relief_network::*;
