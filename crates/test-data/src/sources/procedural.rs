//! Procedural route generation and recording.
//!
//! A route is a clean random-walk polyline. Recording it produces the
//! sample stream a GPS watch would: jittered positions, terrain altitude,
//! profile-driven speed and heart rate, and occasional sensor dropouts.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use segments::{
    geo_primitives::haversine,
    models::{BoundingBox, GeoPoint, PointSample},
};
use time::{Duration, OffsetDateTime};

use crate::config::{Region, random_point};
use crate::profiles::{self, AthleteProfile};
use crate::terrain::ElevationGenerator;

/// Configuration for procedural route generation.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Target distance in meters.
    pub distance_meters: f64,
    /// Starting point. If None, random within bounds.
    pub start_point: Option<GeoPoint>,
    /// Geographic bounds for the route.
    pub bounds: BoundingBox,
    /// GPS position jitter standard deviation in meters.
    pub gps_jitter_m: f64,
    /// GPS elevation jitter standard deviation in meters.
    pub elevation_jitter_m: f64,
    /// Approximate distance between route points in meters.
    pub point_spacing_m: f64,
    /// Probability of inserting a pause (0.0 - 1.0).
    pub pause_probability: f64,
    /// Duration range for pauses (min, max) in seconds.
    pub pause_duration_range: (f64, f64),
    /// Per-sample probability that the heart-rate strap drops out.
    pub hr_dropout_probability: f64,
    /// Length range of a dropout in samples (min, max).
    pub hr_dropout_len: (usize, usize),
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            distance_meters: 5000.0,
            start_point: None,
            bounds: Region::BOULDER,
            gps_jitter_m: 3.0,
            elevation_jitter_m: 2.0,
            point_spacing_m: 10.0,
            pause_probability: 0.01,
            pause_duration_range: (30.0, 180.0),
            hr_dropout_probability: 0.005,
            hr_dropout_len: (3, 15),
        }
    }
}

/// Generates synthetic routes and noisy recordings of them.
pub struct ProceduralGenerator {
    config: TrackConfig,
    elevation: ElevationGenerator,
}

impl ProceduralGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            config: TrackConfig::default(),
            elevation: ElevationGenerator::boulder(seed),
        }
    }

    /// Creates a generator for a specific region.
    pub fn for_region(bounds: BoundingBox, seed: u32) -> Self {
        let elevation = if bounds.min_lat < Region::BOULDER.min_lat {
            ElevationGenerator::reno_tahoe(seed)
        } else {
            ElevationGenerator::boulder(seed)
        };

        Self {
            config: TrackConfig {
                bounds,
                ..Default::default()
            },
            elevation,
        }
    }

    pub fn with_distance(mut self, meters: f64) -> Self {
        self.config.distance_meters = meters;
        self
    }

    pub fn with_start(mut self, start: GeoPoint) -> Self {
        self.config.start_point = Some(start);
        self
    }

    pub fn with_gps_jitter(mut self, meters: f64) -> Self {
        self.config.gps_jitter_m = meters;
        self
    }

    pub fn with_elevation(mut self, elevation: ElevationGenerator) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_pauses(mut self, probability: f64, min_sec: f64, max_sec: f64) -> Self {
        self.config.pause_probability = probability;
        self.config.pause_duration_range = (min_sec, max_sec);
        self
    }

    pub fn with_hr_dropouts(mut self, probability: f64, min_len: usize, max_len: usize) -> Self {
        self.config.hr_dropout_probability = probability;
        self.config.hr_dropout_len = (min_len, max_len.max(min_len));
        self
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    /// Terrain altitude at each point.
    pub fn altitudes(&self, path: &[GeoPoint]) -> Vec<f64> {
        self.elevation.profile(path)
    }

    /// Generates a clean path (coordinates only, no timing).
    pub fn generate_path(&self, rng: &mut impl Rng) -> Vec<GeoPoint> {
        let start = self
            .config
            .start_point
            .unwrap_or_else(|| random_point(&self.config.bounds, rng));

        let mut path = vec![start];
        let mut current = start;
        let mut total_distance = 0.0;

        // Random walk with some momentum to create natural-looking paths
        let mut heading: f64 = rng.gen_range(0.0..std::f64::consts::TAU);

        while total_distance < self.config.distance_meters {
            heading += rng.gen_range(-0.3..0.3);
            let step = self.config.point_spacing_m * rng.gen_range(0.8..1.2);

            let mut next = current.offset(step * heading.cos(), step * heading.sin());
            if !self.config.bounds.contains(&next) {
                // Turn around at the edge of the region.
                heading += std::f64::consts::PI;
                next = current.offset(step * heading.cos(), step * heading.sin());
            }

            current = next;
            path.push(current);
            total_distance += step;
        }

        path
    }

    /// Records one pass over `path` starting at `start_time`.
    pub fn record(
        &self,
        path: &[GeoPoint],
        profile: &dyn AthleteProfile,
        start_time: OffsetDateTime,
        rng: &mut impl Rng,
    ) -> Vec<PointSample> {
        let terrain = self.altitudes(path);
        // One variance factor per recording: some days are better than others.
        let day_factor = profiles::sample_variance(profile, rng);

        let mut samples = Vec::with_capacity(path.len());
        let mut timestamp = start_time;
        let mut cumulative_distance = 0.0;
        let mut previous: Option<GeoPoint> = None;
        let mut dropout_remaining = 0usize;

        for (index, &point) in path.iter().enumerate() {
            let (grade, leg) = match index {
                0 => (0.0, 0.0),
                _ => {
                    let leg = haversine(path[index - 1], point);
                    let grade = if leg > 0.0 {
                        (terrain[index] - terrain[index - 1]) / leg
                    } else {
                        0.0
                    };
                    (grade, leg)
                }
            };

            let speed = profiles::speed_at_grade(profile, grade, day_factor);
            let paused = index > 0 && rng.r#gen::<f64>() < self.config.pause_probability;
            if index > 0 {
                let pause_seconds = if paused {
                    rng.gen_range(self.config.pause_duration_range.0..=self.config.pause_duration_range.1)
                } else {
                    0.0
                };
                timestamp += Duration::seconds_f64(leg / speed + pause_seconds);
            }

            if dropout_remaining == 0 && rng.r#gen::<f64>() < self.config.hr_dropout_probability {
                let (min_len, max_len) = self.config.hr_dropout_len;
                dropout_remaining = rng.gen_range(min_len..=max_len);
            }
            let heart_rate = if dropout_remaining > 0 {
                dropout_remaining -= 1;
                None
            } else {
                Some(profiles::heart_rate_at(profile, grade, day_factor).round())
            };

            let recorded = point.offset(
                gaussian(self.config.gps_jitter_m, rng),
                gaussian(self.config.gps_jitter_m, rng),
            );
            if let Some(prev) = previous {
                cumulative_distance += haversine(prev, recorded);
            }
            previous = Some(recorded);

            samples.push(PointSample {
                index,
                timestamp,
                location: Some(recorded),
                altitude: Some(terrain[index] + gaussian(self.config.elevation_jitter_m, rng)),
                heart_rate,
                speed: Some(speed),
                cadence: Some(profile.cadence().round()),
                grade: Some(grade),
                moving: Some(!paused),
                cumulative_distance,
            });
        }

        samples
    }
}

/// Zero-mean normal sample, or zero when the deviation is not positive.
fn gaussian(std_dev: f64, rng: &mut impl Rng) -> f64 {
    match Normal::new(0.0, std_dev) {
        Ok(normal) if std_dev > 0.0 => normal.sample(rng),
        _ => 0.0,
    }
}
