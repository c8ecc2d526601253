//! Terrain generation utilities.
//!
//! Elevation profiles come from Perlin noise so that repeated recordings of
//! the same route see the same hills.

mod elevation;

pub use elevation::ElevationGenerator;
