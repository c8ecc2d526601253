//! Storage seams of the engine.
//!
//! `RouteStore` owns routes, activity summaries and segments. `CacheStore`
//! owns the match cache rows and the per-list freshness markers. Both are
//! implemented by the Postgres [`Database`](crate::database::Database) and by
//! [`InMemoryStore`](crate::memory::InMemoryStore).

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    errors::AppError,
    models::{
        ActivitySummary, BoundingBox, CacheEntry, CacheKey, ListKey, Match, ResolvedRange, Route,
        Segment, SegmentGeometry, SegmentMetrics,
    },
};

#[async_trait]
pub trait RouteStore: Send + Sync {
    /// The route of `activity_id`. `NotFound` when missing, `Forbidden` when
    /// it belongs to someone other than `athlete_id`.
    async fn get_route(&self, athlete_id: i64, activity_id: i64) -> Result<Route, AppError>;

    /// Several routes at once. Ids that vanished since they were listed are skipped.
    async fn get_routes(&self, athlete_id: i64, activity_ids: &[i64]) -> Result<Vec<Route>, AppError> {
        let mut routes = Vec::with_capacity(activity_ids.len());
        for &activity_id in activity_ids {
            match self.get_route(athlete_id, activity_id).await {
                Ok(route) => routes.push(route),
                Err(AppError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(routes)
    }

    async fn get_segment(&self, segment_id: i64) -> Result<Segment, AppError>;

    /// The athlete's segments ordered by name.
    async fn list_segments(&self, athlete_id: i64) -> Result<Vec<Segment>, AppError>;

    /// Ids of the athlete's routes whose bounds intersect `bbox`.
    async fn list_candidate_routes(
        &self,
        athlete_id: i64,
        bbox: BoundingBox,
    ) -> Result<Vec<i64>, AppError>;

    async fn get_activity_summary(&self, activity_id: i64) -> Result<ActivitySummary, AppError>;

    /// Summaries of the athlete's activities among `activity_ids`.
    async fn get_activity_summaries(
        &self,
        athlete_id: i64,
        activity_ids: &[i64],
    ) -> Result<Vec<ActivitySummary>, AppError>;

    async fn insert_segment(
        &self,
        athlete_id: i64,
        name: &str,
        description: Option<&str>,
        geometry: &SegmentGeometry,
    ) -> Result<Segment, AppError>;

    async fn update_segment_geometry(
        &self,
        segment_id: i64,
        name: &str,
        description: Option<&str>,
        geometry: &SegmentGeometry,
    ) -> Result<Segment, AppError>;

    async fn delete_segment(&self, segment_id: i64) -> Result<(), AppError>;

    /// Stores the summary and replaces the route's samples and bounds.
    async fn insert_activity(&self, summary: &ActivitySummary, route: &Route)
    -> Result<(), AppError>;

    async fn delete_activity(&self, activity_id: i64) -> Result<(), AppError>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_entry(&self, key: CacheKey) -> Result<Option<CacheEntry>, AppError>;

    /// All rows for a segment at one tolerance.
    async fn list_entries(&self, key: ListKey) -> Result<Vec<CacheEntry>, AppError>;

    /// When the last full matcher pass for this list completed.
    async fn list_refreshed_at(&self, key: ListKey) -> Result<Option<OffsetDateTime>, AppError>;

    /// Writes the result of a full matcher pass: upserts the match columns
    /// (keeping any stored range and metrics), deletes rows of activities that
    /// no longer match and stamps the list marker with `now`.
    async fn replace_matches(
        &self,
        key: ListKey,
        matches: &[Match],
        now: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// Upserts the match columns of one row.
    async fn upsert_match(
        &self,
        key: CacheKey,
        matched: &Match,
        now: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// Upserts match, range and metrics into one row.
    async fn store_resolution(
        &self,
        key: CacheKey,
        matched: &Match,
        range: ResolvedRange,
        metrics: &SegmentMetrics,
        now: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// Drops every row and list marker of the segment. Returns the rows removed.
    async fn invalidate_segment(&self, segment_id: i64) -> Result<u64, AppError>;

    /// Drops every row of the activity, plus the list markers those rows
    /// belonged to. Returns the rows removed.
    async fn invalidate_activity(&self, activity_id: i64) -> Result<u64, AppError>;
}

/// `Forbidden` unless the requester owns the resource.
pub fn ensure_owner(owner_id: i64, requester_id: i64) -> Result<(), AppError> {
    if owner_id == requester_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
