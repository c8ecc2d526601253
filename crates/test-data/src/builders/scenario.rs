//! Fluent builder for constructing test scenarios.

use std::time::Instant;

use rand::Rng;
use segments::{
    engine::{NewActivity, SegmentDraft},
    models::{BoundingBox, GeoPoint},
    ranking::SortKey,
};
use time::{Duration, OffsetDateTime, macros::datetime};
use tracing::info;

use crate::config::SeedConfig;
use crate::db::{SeedError, Seeder};
use crate::generators::{ActivityGenerator, SegmentExtractConfig, SegmentGenerator};
use crate::profiles::{AthleteProfile, CyclistProfile, RunnerProfile};
use crate::sources::ProceduralGenerator;

const FIRST_RECORDING: OffsetDateTime = datetime!(2024-03-01 07:00 UTC);
const EXTRACT_ATTEMPTS: usize = 5;

/// One generated route and everything cut from or recorded over it.
#[derive(Debug, Clone)]
pub struct RouteScenario {
    pub athlete_id: i64,
    pub path: Vec<GeoPoint>,
    pub segments: Vec<SegmentDraft>,
    pub activities: Vec<NewActivity>,
}

/// Generated data, not yet stored.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub routes: Vec<RouteScenario>,
}

impl Scenario {
    pub fn segments(&self) -> Vec<(i64, SegmentDraft)> {
        self.routes
            .iter()
            .flat_map(|r| r.segments.iter().map(|s| (r.athlete_id, s.clone())))
            .collect()
    }

    pub fn activities(&self) -> Vec<(i64, NewActivity)> {
        self.routes
            .iter()
            .flat_map(|r| r.activities.iter().map(|a| (r.athlete_id, a.clone())))
            .collect()
    }

    pub fn total_samples(&self) -> usize {
        self.routes
            .iter()
            .flat_map(|r| &r.activities)
            .map(|a| a.samples.len())
            .sum()
    }
}

/// Result of building and seeding a scenario.
#[derive(Debug)]
pub struct ScenarioResult {
    pub scenario: Scenario,
    /// Stored segment ids, in the order of [`Scenario::segments`].
    pub segment_ids: Vec<i64>,
    pub metrics: ScenarioMetrics,
}

/// Timings and counts from a scenario build.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    pub generation_time_ms: u64,
    /// Zero when only `build_data` ran.
    pub seeding_time_ms: u64,
    /// Zero unless the cache was warmed.
    pub warm_time_ms: u64,
    pub athlete_count: usize,
    pub segment_count: usize,
    pub activity_count: usize,
    pub total_samples: usize,
    /// Match rows found while warming the cache.
    pub cached_matches: usize,
}

/// Builder for athletes who repeat routes and favorite parts of them.
///
/// # Example
///
/// ```rust,ignore
/// let result = ScenarioBuilder::new()
///     .with_athletes(3)
///     .with_region(Region::BOULDER)
///     .with_activities_per_route(2, 4)
///     .with_warm_cache()
///     .build(&seeder, &mut rng)
///     .await?;
/// ```
pub struct ScenarioBuilder {
    config: SeedConfig,
    seed: u32,
    warm_cache: bool,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self::from_config(SeedConfig::default())
    }

    pub fn from_config(config: SeedConfig) -> Self {
        Self {
            config,
            seed: 42,
            warm_cache: false,
        }
    }

    pub fn with_athletes(mut self, count: usize) -> Self {
        self.config.athlete_count = count;
        self
    }

    pub fn with_region(mut self, region: BoundingBox) -> Self {
        self.config.region = region;
        self
    }

    pub fn with_routes_per_athlete(mut self, min: usize, max: usize) -> Self {
        self.config.routes_per_athlete = (min, max.max(min));
        self
    }

    pub fn with_activities_per_route(mut self, min: usize, max: usize) -> Self {
        self.config.activities_per_route = (min, max.max(min));
        self
    }

    pub fn with_segments_per_route(mut self, count: usize) -> Self {
        self.config.segments_per_route = count;
        self
    }

    pub fn with_route_distance(mut self, meters: f64) -> Self {
        self.config.route_distance_m = meters;
        self
    }

    /// Sets the terrain noise seed.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Lists matches for every seeded segment once seeding finishes.
    pub fn with_warm_cache(mut self) -> Self {
        self.warm_cache = true;
        self
    }

    /// Generates the scenario without storing it.
    pub fn build_data(&self, rng: &mut impl Rng) -> Scenario {
        let tracks = ProceduralGenerator::for_region(self.config.region, self.seed)
            .with_distance(self.config.route_distance_m);
        let segment_gen = SegmentGenerator::with_config(SegmentExtractConfig {
            max_length_m: self.config.route_distance_m,
            ..Default::default()
        });
        let activity_gen = ActivityGenerator::new();

        let mut routes = Vec::new();
        let mut next_activity_id = self.config.first_activity_id;

        for a in 0..self.config.athlete_count {
            let athlete_id = self.config.first_athlete_id + a as i64;
            let profile: Box<dyn AthleteProfile> = if a % 2 == 0 {
                Box::new(RunnerProfile::default())
            } else {
                Box::new(CyclistProfile::default())
            };

            let (min_routes, max_routes) = self.config.routes_per_athlete;
            for r in 0..rng.gen_range(min_routes..=max_routes) {
                let path = tracks.generate_path(rng);
                let altitudes = tracks.altitudes(&path);

                let segments = (0..self.config.segments_per_route)
                    .filter_map(|k| {
                        (0..EXTRACT_ATTEMPTS).find_map(|_| {
                            let length = rng.gen_range(0.15..0.4);
                            let start = rng.gen_range(0.0..(1.0 - length));
                            segment_gen.extract_from_route(
                                &path,
                                Some(altitudes.as_slice()),
                                start,
                                start + length,
                                format!("Athlete {athlete_id} Route {} Segment {}", r + 1, k + 1),
                            )
                        })
                    })
                    .collect();

                let (min_acts, max_acts) = self.config.activities_per_route;
                let activities = (0..rng.gen_range(min_acts..=max_acts))
                    .map(|_| {
                        let start_time = FIRST_RECORDING
                            + Duration::days(rng.gen_range(0..180))
                            + Duration::minutes(rng.gen_range(0..720));
                        let samples = tracks.record(&path, profile.as_ref(), start_time, rng);
                        let activity = activity_gen.from_samples(next_activity_id, samples, rng);
                        next_activity_id += 1;
                        activity
                    })
                    .collect();

                routes.push(RouteScenario {
                    athlete_id,
                    path,
                    segments,
                    activities,
                });
            }
        }

        Scenario { routes }
    }

    /// Generates the scenario and stores it through `seeder`.
    pub async fn build(
        self,
        seeder: &Seeder,
        rng: &mut impl Rng,
    ) -> Result<ScenarioResult, SeedError> {
        let generation_start = Instant::now();
        let scenario = self.build_data(rng);
        let generation_time_ms = generation_start.elapsed().as_millis() as u64;

        let seeding_start = Instant::now();
        let segments = seeder.seed_segments(&scenario.segments()).await?;
        let activities = seeder.seed_activities(&scenario.activities()).await?;
        let seeding_time_ms = seeding_start.elapsed().as_millis() as u64;

        let mut warm_time_ms = 0;
        let mut cached_matches = 0;
        if self.warm_cache {
            let warm_start = Instant::now();
            for segment in &segments {
                cached_matches += seeder
                    .engine()
                    .list_matches(segment.athlete_id, segment.id, None, SortKey::default(), false)
                    .await?
                    .len();
            }
            warm_time_ms = warm_start.elapsed().as_millis() as u64;
            info!(segments = segments.len(), cached_matches, "Warmed match cache");
        }

        let metrics = ScenarioMetrics {
            generation_time_ms,
            seeding_time_ms,
            warm_time_ms,
            athlete_count: self.config.athlete_count,
            segment_count: segments.len(),
            activity_count: activities.len(),
            total_samples: scenario.total_samples(),
            cached_matches,
        };

        Ok(ScenarioResult {
            scenario,
            segment_ids: segments.iter().map(|s| s.id).collect(),
            metrics,
        })
    }
}
