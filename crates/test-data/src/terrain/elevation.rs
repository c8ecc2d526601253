//! Perlin noise-based elevation generation.

use noise::{NoiseFn, Perlin};
use segments::models::GeoPoint;

/// Generates realistic elevation data using Perlin noise.
///
/// The generator uses multiple octaves of Perlin noise to create
/// natural-looking terrain with both large-scale features and
/// small-scale variation.
#[derive(Debug, Clone)]
pub struct ElevationGenerator {
    perlin: Perlin,
    /// Base elevation in meters (e.g., valley floor).
    base_elevation: f64,
    /// Scale factor for terrain height variation.
    height_scale: f64,
    /// Spatial frequency in cycles per degree.
    frequency: f64,
    /// Number of noise octaves for detail.
    octaves: u32,
}

impl ElevationGenerator {
    /// Creates a generator configured for the Reno/Tahoe region.
    pub fn reno_tahoe(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation: 1900.0, // Lake Tahoe elevation ~1900m
            height_scale: 800.0,
            frequency: 8.0,
            octaves: 5,
        }
    }

    /// Creates a generator configured for the Boulder, CO region.
    pub fn boulder(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation: 1650.0, // Boulder elevation ~1650m
            height_scale: 600.0,
            frequency: 10.0,
            octaves: 4,
        }
    }

    /// Creates a generator for rolling hills.
    pub fn flat(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation: 300.0,
            height_scale: 50.0,
            frequency: 20.0,
            octaves: 2,
        }
    }

    /// Elevation at a coordinate, as fractal Brownian motion over Perlin noise.
    pub fn elevation_at(&self, point: GeoPoint) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.frequency;
        let mut max_amplitude = 0.0;

        for _ in 0..self.octaves {
            total += self.perlin.get([point.lat * frequency, point.lon * frequency]) * amplitude;
            max_amplitude += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        self.base_elevation + (total / max_amplitude) * self.height_scale
    }

    pub fn profile(&self, points: &[GeoPoint]) -> Vec<f64> {
        points.iter().map(|&p| self.elevation_at(p)).collect()
    }
}
