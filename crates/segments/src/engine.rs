//! Request-level operations: ownership checks, tolerance handling and the
//! matcher, resolver and aggregator wired through the match cache.

use std::{collections::HashMap, sync::Arc, time::Instant};

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    cache::{Computation, MatchCache, Resolution, Source},
    clock::{Clock, SystemClock},
    config::EngineConfig,
    database::Database,
    errors::AppError,
    geo_primitives::{GeoPrimitives, GeodesicPrimitives},
    models::{
        ActivitySummary, CacheKey, GeoPoint, ListKey, MatchedActivity, PointSample, ResolvedRange,
        Route, Segment, SegmentGeometry, SegmentMetrics, SegmentSummary,
    },
    ranking::{SortKey, rank},
    resolver::resolve_range,
    scoring::aggregate,
    segment_matching::{evaluate_route, find_matches, run_blocking},
    series::{self, HeartRateZones, Series, SeriesKind},
    store::{CacheStore, RouteStore, ensure_owner},
};

/// Fields of a new or edited segment.
#[derive(Debug, Clone)]
pub struct SegmentDraft {
    pub name: String,
    pub description: Option<String>,
    pub vertices: Vec<GeoPoint>,
    /// One entry per vertex when known.
    pub altitudes: Option<Vec<Option<f64>>>,
}

/// An activity to store, replacing any earlier upload with the same id.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub activity_id: i64,
    pub name: String,
    pub start_date: OffsetDateTime,
    pub elapsed_time_s: f64,
    pub average_heartrate: Option<f64>,
    pub average_speed: Option<f64>,
    pub samples: Vec<PointSample>,
}

#[derive(Clone)]
pub struct SegmentEngine {
    routes: Arc<dyn RouteStore>,
    cache: Arc<MatchCache>,
    geo: Arc<dyn GeoPrimitives>,
    config: EngineConfig,
}

impl SegmentEngine {
    pub fn new(
        routes: Arc<dyn RouteStore>,
        cache_store: Arc<dyn CacheStore>,
        geo: Arc<dyn GeoPrimitives>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            routes,
            cache: Arc::new(MatchCache::new(cache_store, clock, config.match_list_ttl)),
            geo,
            config,
        }
    }

    /// Postgres-backed engine with geodesic primitives and the system clock.
    pub fn with_database(db: Database, config: EngineConfig) -> Self {
        let db = Arc::new(db);
        Self::new(
            db.clone(),
            db,
            Arc::new(GeodesicPrimitives),
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    fn tolerance(&self, requested: Option<f64>) -> Result<f64, AppError> {
        let tolerance = requested.unwrap_or(self.config.default_tolerance_m);
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "Tolerance must be a non-negative number of meters (got {tolerance})"
            )));
        }
        Ok(tolerance)
    }

    async fn owned_segment(&self, athlete_id: i64, segment_id: i64) -> Result<Segment, AppError> {
        let segment = self.routes.get_segment(segment_id).await?;
        ensure_owner(segment.athlete_id, athlete_id)?;
        Ok(segment)
    }

    async fn owned_activity(
        &self,
        athlete_id: i64,
        activity_id: i64,
    ) -> Result<ActivitySummary, AppError> {
        let summary = self.routes.get_activity_summary(activity_id).await?;
        ensure_owner(summary.athlete_id, athlete_id)?;
        Ok(summary)
    }

    /// Activities of the athlete that pass through the segment, ranked by `sort`.
    pub async fn list_matches(
        &self,
        athlete_id: i64,
        segment_id: i64,
        tolerance_m: Option<f64>,
        sort: SortKey,
        force_refresh: bool,
    ) -> Result<Vec<MatchedActivity>, AppError> {
        let segment = self.owned_segment(athlete_id, segment_id).await?;
        let key = ListKey::new(segment.id, self.tolerance(tolerance_m)?);

        let started = Instant::now();
        let (entries, source) = self
            .cache
            .get_or_refresh_list(key, force_refresh, || {
                find_matches(
                    self.routes.as_ref(),
                    self.geo.clone(),
                    athlete_id,
                    &segment,
                    key.tolerance_m(),
                )
            })
            .await?;
        if source != Source::Cache {
            info!(
                segment_id,
                tolerance_m = key.tolerance_m(),
                matches = entries.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Matcher pass complete"
            );
        }

        let ids: Vec<i64> = entries.iter().map(|e| e.matched.activity_id).collect();
        let summaries: HashMap<i64, ActivitySummary> = self
            .routes
            .get_activity_summaries(athlete_id, &ids)
            .await?
            .into_iter()
            .map(|s| (s.activity_id, s))
            .collect();

        let items = entries
            .iter()
            .filter_map(|entry| {
                summaries
                    .get(&entry.matched.activity_id)
                    .map(|summary| MatchedActivity::new(entry, summary))
            })
            .collect();

        Ok(rank(items, sort))
    }

    async fn resolve(
        &self,
        athlete_id: i64,
        segment_id: i64,
        activity_id: i64,
        tolerance_m: Option<f64>,
    ) -> Result<Resolution, AppError> {
        let segment = self.owned_segment(athlete_id, segment_id).await?;
        // Ownership is checked before the cache is consulted: rows are shared
        // and do not record who asked.
        self.owned_activity(athlete_id, activity_id).await?;

        let key = CacheKey::new(segment.id, activity_id, self.tolerance(tolerance_m)?);
        let tolerance = key.tolerance_m();
        let routes = self.routes.clone();
        let geo = self.geo.clone();

        let resolution = self
            .cache
            .get_or_compute(key, move |existing| async move {
                let route = routes.get_route(athlete_id, activity_id).await?;
                run_blocking(move || {
                    let matched = match existing {
                        Some(entry) => Some(entry.matched),
                        None => evaluate_route(
                            geo.as_ref(),
                            &segment,
                            activity_id,
                            &route.polyline(),
                            tolerance,
                        ),
                    };
                    let resolved = resolve_range(geo.as_ref(), &segment.vertices, &route, tolerance)
                        .map(|range| (range, aggregate(geo.as_ref(), &route, range)));
                    Computation { matched, resolved }
                })
                .await
            })
            .await?;

        debug!(
            segment_id,
            activity_id,
            source = ?resolution.source,
            "Resolved segment pass"
        );
        Ok(resolution)
    }

    pub async fn resolve_indices(
        &self,
        athlete_id: i64,
        segment_id: i64,
        activity_id: i64,
        tolerance_m: Option<f64>,
    ) -> Result<ResolvedRange, AppError> {
        Ok(self
            .resolve(athlete_id, segment_id, activity_id, tolerance_m)
            .await?
            .range)
    }

    pub async fn segment_activity_metrics(
        &self,
        athlete_id: i64,
        segment_id: i64,
        activity_id: i64,
        tolerance_m: Option<f64>,
    ) -> Result<SegmentMetrics, AppError> {
        Ok(self
            .resolve(athlete_id, segment_id, activity_id, tolerance_m)
            .await?
            .metrics)
    }

    pub async fn segment_series(
        &self,
        athlete_id: i64,
        segment_id: i64,
        activity_id: i64,
        tolerance_m: Option<f64>,
        kinds: &[SeriesKind],
        zones: Option<&HeartRateZones>,
    ) -> Result<Vec<Series>, AppError> {
        let resolution = self
            .resolve(athlete_id, segment_id, activity_id, tolerance_m)
            .await?;
        let route = self.routes.get_route(athlete_id, activity_id).await?;
        Ok(series::extract(&route, resolution.range, kinds, zones))
    }

    pub async fn invalidate_segment(&self, athlete_id: i64, segment_id: i64) -> Result<u64, AppError> {
        self.owned_segment(athlete_id, segment_id).await?;
        self.cache.invalidate_segment(segment_id).await
    }

    pub async fn invalidate_activity(
        &self,
        athlete_id: i64,
        activity_id: i64,
    ) -> Result<u64, AppError> {
        self.owned_activity(athlete_id, activity_id).await?;
        self.cache.invalidate_activity(activity_id).await
    }

    pub async fn list_segments(&self, athlete_id: i64) -> Result<Vec<Segment>, AppError> {
        self.routes.list_segments(athlete_id).await
    }

    pub async fn get_segment(&self, athlete_id: i64, segment_id: i64) -> Result<Segment, AppError> {
        self.owned_segment(athlete_id, segment_id).await
    }

    pub async fn segment_summary(
        &self,
        athlete_id: i64,
        segment_id: i64,
    ) -> Result<SegmentSummary, AppError> {
        let segment = self.owned_segment(athlete_id, segment_id).await?;
        Ok(SegmentSummary::from(&segment))
    }

    pub async fn create_segment(&self, athlete_id: i64, draft: SegmentDraft) -> Result<Segment, AppError> {
        let (name, geometry) = validate_draft(&draft)?;
        let segment = self
            .routes
            .insert_segment(athlete_id, &name, draft.description.as_deref(), &geometry)
            .await?;
        info!(segment_id = segment.id, athlete_id, length_m = segment.length_m, "Created segment");
        Ok(segment)
    }

    /// Replaces a segment's geometry and drops everything cached for it.
    pub async fn update_segment(
        &self,
        athlete_id: i64,
        segment_id: i64,
        draft: SegmentDraft,
    ) -> Result<Segment, AppError> {
        self.owned_segment(athlete_id, segment_id).await?;
        let (name, geometry) = validate_draft(&draft)?;
        let segment = self
            .routes
            .update_segment_geometry(segment_id, &name, draft.description.as_deref(), &geometry)
            .await?;
        self.cache.invalidate_segment(segment_id).await?;
        info!(segment_id, "Updated segment");
        Ok(segment)
    }

    pub async fn delete_segment(&self, athlete_id: i64, segment_id: i64) -> Result<(), AppError> {
        self.owned_segment(athlete_id, segment_id).await?;
        self.cache.invalidate_segment(segment_id).await?;
        self.routes.delete_segment(segment_id).await?;
        // Drops anything a pass racing the delete managed to write.
        self.cache.invalidate_segment(segment_id).await?;
        info!(segment_id, "Deleted segment");
        Ok(())
    }

    /// Stores an activity wholesale. Re-uploading an id replaces its samples
    /// and drops its cached rows.
    pub async fn ingest_activity(
        &self,
        athlete_id: i64,
        activity: NewActivity,
    ) -> Result<ActivitySummary, AppError> {
        match self.routes.get_activity_summary(activity.activity_id).await {
            Ok(existing) => ensure_owner(existing.athlete_id, athlete_id)?,
            Err(AppError::NotFound) => {}
            Err(e) => return Err(e),
        }
        if activity.name.trim().is_empty() {
            return Err(AppError::InvalidInput("Activity name is required".to_string()));
        }
        if !activity.elapsed_time_s.is_finite() || activity.elapsed_time_s < 0.0 {
            return Err(AppError::InvalidInput(
                "Elapsed time must be a non-negative number of seconds".to_string(),
            ));
        }

        let route = Route::new(activity.activity_id, athlete_id, activity.samples)?;
        let summary = ActivitySummary {
            activity_id: activity.activity_id,
            athlete_id,
            name: activity.name.trim().to_string(),
            start_date: activity.start_date,
            elapsed_time_s: activity.elapsed_time_s,
            average_heartrate: activity.average_heartrate,
            average_speed: activity.average_speed,
        };

        self.routes.insert_activity(&summary, &route).await?;
        self.cache.invalidate_activity(summary.activity_id).await?;
        info!(
            activity_id = summary.activity_id,
            athlete_id,
            samples = route.len(),
            "Stored activity"
        );
        Ok(summary)
    }

    pub async fn delete_activity(&self, athlete_id: i64, activity_id: i64) -> Result<(), AppError> {
        self.owned_activity(athlete_id, activity_id).await?;
        self.cache.invalidate_activity(activity_id).await?;
        self.routes.delete_activity(activity_id).await?;
        self.cache.invalidate_activity(activity_id).await?;
        info!(activity_id, "Deleted activity");
        Ok(())
    }
}

fn validate_draft(draft: &SegmentDraft) -> Result<(String, SegmentGeometry), AppError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Segment name is required".to_string()));
    }
    let geometry = SegmentGeometry::new(draft.vertices.clone(), draft.altitudes.as_deref())?;
    Ok((name.to_string(), geometry))
}
