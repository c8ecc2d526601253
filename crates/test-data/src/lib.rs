//! Test data generation for the segments service.
//!
//! Generates athletes who repeat the same routes, favorite segments cut out
//! of those routes, and noisy recordings of every pass. Useful for manual
//! verification of match listings and for load-testing the match cache.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_data::prelude::*;
//!
//! let seeder = Seeder::from_pool(pool);
//! let result = ScenarioBuilder::new()
//!     .with_athletes(10)
//!     .with_region(Region::RENO_TAHOE)
//!     .with_route_distance(8000.0)
//!     .with_warm_cache()
//!     .build(&seeder, &mut rng)
//!     .await?;
//! ```

pub mod builders;
pub mod config;
pub mod db;
pub mod generators;
pub mod profiles;
pub mod sources;
pub mod terrain;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::builders::{Scenario, ScenarioBuilder, ScenarioMetrics, ScenarioResult};
    pub use crate::config::{Region, SeedConfig};
    pub use crate::db::{SeedError, Seeder};
    pub use crate::generators::{ActivityGenerator, SegmentGenerator};
    pub use crate::profiles::{
        AthleteProfile, CyclistProfile, RunnerProfile, sample_variance, speed_at_grade,
    };
    pub use crate::sources::{ProceduralGenerator, TrackConfig};
    pub use crate::terrain::ElevationGenerator;
    pub use segments::models::{BoundingBox, GeoPoint, PointSample};
}
