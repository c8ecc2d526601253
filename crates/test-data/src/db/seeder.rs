//! Seeding through the segment engine.
//!
//! Everything goes through [`SegmentEngine`] rather than raw SQL so seeded
//! rows pass the same validation as uploads.

use std::sync::Arc;

use segments::{
    clock::SystemClock,
    config::EngineConfig,
    database::Database,
    engine::{NewActivity, SegmentDraft, SegmentEngine},
    errors::AppError,
    geo_primitives::GeodesicPrimitives,
    memory::InMemoryStore,
    models::{ActivitySummary, Segment},
};
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Engine error: {0}")]
    App(#[from] AppError),
}

/// Inserts generated segments and activities for their athletes.
#[derive(Clone)]
pub struct Seeder {
    engine: SegmentEngine,
}

impl Seeder {
    pub fn new(engine: SegmentEngine) -> Self {
        Self { engine }
    }

    /// Seeder writing to Postgres with the default engine settings.
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(SegmentEngine::with_database(
            Database::new(pool),
            EngineConfig::default(),
        ))
    }

    /// Seeder backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::new(SegmentEngine::new(
            store.clone(),
            store,
            Arc::new(GeodesicPrimitives),
            Arc::new(SystemClock),
            EngineConfig::default(),
        ))
    }

    pub fn engine(&self) -> &SegmentEngine {
        &self.engine
    }

    pub async fn seed_segments(
        &self,
        segments: &[(i64, SegmentDraft)],
    ) -> Result<Vec<Segment>, SeedError> {
        info!("Seeding {} segments...", segments.len());
        let mut created = Vec::with_capacity(segments.len());
        for (athlete_id, draft) in segments {
            created.push(self.engine.create_segment(*athlete_id, draft.clone()).await?);
        }
        info!("Seeded {} segments", created.len());
        Ok(created)
    }

    pub async fn seed_activities(
        &self,
        activities: &[(i64, NewActivity)],
    ) -> Result<Vec<ActivitySummary>, SeedError> {
        info!("Seeding {} activities...", activities.len());
        let mut stored = Vec::with_capacity(activities.len());
        for (athlete_id, activity) in activities {
            stored.push(
                self.engine
                    .ingest_activity(*athlete_id, activity.clone())
                    .await?,
            );
        }
        info!("Seeded {} activities", stored.len());
        Ok(stored)
    }
}
