//! Decides which of an athlete's routes pass through a segment.
//!
//! A route matches when every segment vertex lies within the tolerance of
//! the route polyline. The route may wander elsewhere, but it has to cover
//! the whole segment. Matches are scored by the worst vertex distance and by
//! how much of the segment lies inside the route's tolerance corridor.

use std::{cmp::Ordering, sync::Arc};

use rayon::prelude::*;
use tracing::debug;

use crate::{
    errors::AppError,
    geo_primitives::GeoPrimitives,
    models::{GeoPoint, Match, Segment},
    store::RouteStore,
};

/// Scores one route against a segment, or `None` if it does not match.
pub fn evaluate_route(
    geo: &dyn GeoPrimitives,
    segment: &Segment,
    activity_id: i64,
    route_line: &[GeoPoint],
    tolerance_m: f64,
) -> Option<Match> {
    if route_line.is_empty() {
        return None;
    }

    let mut worst = 0.0_f64;
    for vertex in &segment.vertices {
        let distance = geo.distance_point_to_polyline(*vertex, route_line);
        if distance.is_nan() || distance > tolerance_m {
            return None;
        }
        worst = worst.max(distance);
    }

    let overlap = geo.intersection_length(route_line, tolerance_m, &segment.vertices);
    if overlap <= 0.0 {
        return None;
    }

    Some(Match::new(activity_id, worst, overlap, segment.length_m))
}

/// Tightest fit first, then the larger overlap, then activity id.
pub fn compare_matches(a: &Match, b: &Match) -> Ordering {
    a.min_distance_m
        .total_cmp(&b.min_distance_m)
        .then_with(|| b.overlap_percentage.total_cmp(&a.overlap_percentage))
        .then_with(|| a.activity_id.cmp(&b.activity_id))
}

/// Runs a CPU-bound closure off the async reactor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Unavailable(format!("Matcher task failed: {e}")))
}

/// Full matcher pass over the athlete's routes.
///
/// Candidates come from the store's bounding-box pre-filter. A route that
/// covers every vertex within the tolerance necessarily intersects the
/// segment's box grown by the tolerance, so the filter never drops a match.
pub async fn find_matches(
    store: &dyn RouteStore,
    geo: Arc<dyn GeoPrimitives>,
    athlete_id: i64,
    segment: &Segment,
    tolerance_m: f64,
) -> Result<Vec<Match>, AppError> {
    let Some(bbox) = geo.bounding_box(&segment.vertices) else {
        return Ok(Vec::new());
    };

    let candidates = store
        .list_candidate_routes(athlete_id, bbox.expand_by_meters(tolerance_m))
        .await?;
    debug!(
        segment_id = segment.id,
        candidates = candidates.len(),
        "Evaluating candidate routes"
    );
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let routes = store.get_routes(athlete_id, &candidates).await?;
    let segment = segment.clone();

    let mut matches = run_blocking(move || {
        routes
            .par_iter()
            .filter_map(|route| {
                evaluate_route(
                    geo.as_ref(),
                    &segment,
                    route.activity_id,
                    &route.polyline(),
                    tolerance_m,
                )
            })
            .collect::<Vec<_>>()
    })
    .await?;

    matches.sort_by(compare_matches);
    Ok(matches)
}
