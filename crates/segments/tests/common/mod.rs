//! Shared fixtures: an in-memory engine with a manual clock and a route
//! store that counts how often the matcher and resolver reach it.

#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use segments::{
    clock::ManualClock,
    config::EngineConfig,
    engine::{NewActivity, SegmentDraft, SegmentEngine},
    errors::AppError,
    geo_primitives::{GeodesicPrimitives, haversine},
    memory::InMemoryStore,
    models::{ActivitySummary, BoundingBox, GeoPoint, PointSample, Route, Segment, SegmentGeometry},
    store::RouteStore,
};
use time::{Duration, OffsetDateTime, macros::datetime};

pub const ATHLETE: i64 = 1;
pub const OTHER_ATHLETE: i64 = 2;
pub const TOLERANCE_M: f64 = 15.0;

pub const START: OffsetDateTime = datetime!(2024-05-01 08:00 UTC);

pub fn at(north_m: f64, east_m: f64) -> GeoPoint {
    GeoPoint::new(47.6062, -122.3321).offset(north_m, east_m)
}

/// Points every `step_m` along a north-running line `east_m` off the origin.
pub fn northward(from_m: f64, to_m: f64, east_m: f64, step_m: f64) -> Vec<GeoPoint> {
    let steps = ((to_m - from_m) / step_m).round() as usize;
    (0..=steps)
        .map(|i| at(from_m + i as f64 * step_m, east_m))
        .collect()
}

/// A 1 km line running north from the origin, three vertices.
pub fn kilometer_segment(name: &str) -> SegmentDraft {
    SegmentDraft {
        name: name.to_string(),
        description: None,
        vertices: vec![at(0.0, 0.0), at(500.0, 0.0), at(1000.0, 0.0)],
        altitudes: Some(vec![Some(100.0), Some(110.0), Some(125.0)]),
    }
}

/// One sample per point, a second apart, moving at 3 m/s.
pub fn samples(points: &[GeoPoint], heart_rate: impl Fn(usize) -> Option<f64>) -> Vec<PointSample> {
    let mut distance = 0.0;
    points
        .iter()
        .enumerate()
        .map(|(index, &point)| {
            if index > 0 {
                distance += haversine(points[index - 1], point);
            }
            PointSample {
                index,
                timestamp: START + Duration::seconds(index as i64),
                location: Some(point),
                altitude: Some(100.0 + index as f64 * 0.25),
                heart_rate: heart_rate(index),
                speed: Some(3.0),
                cadence: Some(85.0),
                grade: None,
                moving: Some(true),
                cumulative_distance: distance,
            }
        })
        .collect()
}

pub fn activity(activity_id: i64, samples: Vec<PointSample>, average_heartrate: Option<f64>) -> NewActivity {
    NewActivity {
        activity_id,
        name: format!("Activity {activity_id}"),
        start_date: START + Duration::days(activity_id),
        elapsed_time_s: samples.len() as f64,
        average_heartrate,
        average_speed: Some(3.0),
        samples,
    }
}

/// Delegates to an [`InMemoryStore`], counting candidate scans (one per
/// matcher pass) and single-route loads.
pub struct CountingStore {
    inner: InMemoryStore,
    candidate_scans: AtomicUsize,
    route_loads: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            candidate_scans: AtomicUsize::new(0),
            route_loads: AtomicUsize::new(0),
        }
    }

    pub fn matcher_passes(&self) -> usize {
        self.candidate_scans.load(Ordering::SeqCst)
    }

    pub fn route_loads(&self) -> usize {
        self.route_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteStore for CountingStore {
    async fn get_route(&self, athlete_id: i64, activity_id: i64) -> Result<Route, AppError> {
        self.route_loads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_route(athlete_id, activity_id).await
    }

    async fn get_routes(&self, athlete_id: i64, activity_ids: &[i64]) -> Result<Vec<Route>, AppError> {
        self.inner.get_routes(athlete_id, activity_ids).await
    }

    async fn get_segment(&self, segment_id: i64) -> Result<Segment, AppError> {
        self.inner.get_segment(segment_id).await
    }

    async fn list_segments(&self, athlete_id: i64) -> Result<Vec<Segment>, AppError> {
        self.inner.list_segments(athlete_id).await
    }

    async fn list_candidate_routes(
        &self,
        athlete_id: i64,
        bbox: BoundingBox,
    ) -> Result<Vec<i64>, AppError> {
        self.candidate_scans.fetch_add(1, Ordering::SeqCst);
        self.inner.list_candidate_routes(athlete_id, bbox).await
    }

    async fn get_activity_summary(&self, activity_id: i64) -> Result<ActivitySummary, AppError> {
        self.inner.get_activity_summary(activity_id).await
    }

    async fn get_activity_summaries(
        &self,
        athlete_id: i64,
        activity_ids: &[i64],
    ) -> Result<Vec<ActivitySummary>, AppError> {
        self.inner.get_activity_summaries(athlete_id, activity_ids).await
    }

    async fn insert_segment(
        &self,
        athlete_id: i64,
        name: &str,
        description: Option<&str>,
        geometry: &SegmentGeometry,
    ) -> Result<Segment, AppError> {
        self.inner
            .insert_segment(athlete_id, name, description, geometry)
            .await
    }

    async fn update_segment_geometry(
        &self,
        segment_id: i64,
        name: &str,
        description: Option<&str>,
        geometry: &SegmentGeometry,
    ) -> Result<Segment, AppError> {
        self.inner
            .update_segment_geometry(segment_id, name, description, geometry)
            .await
    }

    async fn delete_segment(&self, segment_id: i64) -> Result<(), AppError> {
        self.inner.delete_segment(segment_id).await
    }

    async fn insert_activity(&self, summary: &ActivitySummary, route: &Route) -> Result<(), AppError> {
        self.inner.insert_activity(summary, route).await
    }

    async fn delete_activity(&self, activity_id: i64) -> Result<(), AppError> {
        self.inner.delete_activity(activity_id).await
    }
}

pub struct Harness {
    pub engine: SegmentEngine,
    pub store: InMemoryStore,
    pub routes: Arc<CountingStore>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    let store = InMemoryStore::new();
    let routes = Arc::new(CountingStore::new(store.clone()));
    let clock = Arc::new(ManualClock::new(START));
    let engine = SegmentEngine::new(
        routes.clone(),
        Arc::new(store.clone()),
        Arc::new(GeodesicPrimitives),
        clock.clone(),
        EngineConfig {
            default_tolerance_m: TOLERANCE_M,
            match_list_ttl: std::time::Duration::from_secs(3600),
        },
    );
    Harness {
        engine,
        store,
        routes,
        clock,
    }
}
