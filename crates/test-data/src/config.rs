//! Configuration types for test data generation.

use rand::Rng;
use segments::models::{BoundingBox, GeoPoint};
use serde::{Deserialize, Serialize};

/// Returns a random point within the bounding box.
pub fn random_point(bounds: &BoundingBox, rng: &mut impl Rng) -> GeoPoint {
    GeoPoint::new(
        rng.gen_range(bounds.min_lat..bounds.max_lat),
        rng.gen_range(bounds.min_lon..bounds.max_lon),
    )
}

/// Returns the center of the bounding box.
pub fn center(bounds: &BoundingBox) -> GeoPoint {
    GeoPoint::new(
        (bounds.min_lat + bounds.max_lat) / 2.0,
        (bounds.min_lon + bounds.max_lon) / 2.0,
    )
}

/// Pre-defined geographic regions for test data generation.
#[derive(Debug, Clone, Copy)]
pub struct Region;

impl Region {
    /// Reno/Tahoe area - mountain trails with significant elevation changes.
    pub const RENO_TAHOE: BoundingBox = BoundingBox::new(39.0, -120.5, 39.6, -119.5);

    /// Boulder, CO area - popular fitness trails with varied terrain.
    pub const BOULDER: BoundingBox = BoundingBox::new(39.9, -105.5, 40.1, -105.2);
}

/// Configuration for seeding operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Number of athletes to generate.
    pub athlete_count: usize,

    /// Distinct routes each athlete runs (min, max).
    pub routes_per_athlete: (usize, usize),

    /// Recorded activities per route (min, max). Each is a noisy retrace.
    pub activities_per_route: (usize, usize),

    /// Favorite segments cut from each route.
    pub segments_per_route: usize,

    /// Target region for route generation.
    pub region: BoundingBox,

    /// Target route length in meters.
    pub route_distance_m: f64,

    /// Id of the first athlete; the rest follow sequentially.
    pub first_athlete_id: i64,

    /// Id of the first activity; the rest follow sequentially.
    pub first_activity_id: i64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            athlete_count: 5,
            routes_per_athlete: (1, 3),
            activities_per_route: (2, 5),
            segments_per_route: 2,
            region: Region::BOULDER,
            route_distance_m: 5000.0,
            first_athlete_id: 1,
            first_activity_id: 1,
        }
    }
}
