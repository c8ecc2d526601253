//! Handlers for activities matched to a segment.

use axum::{
    Extension,
    extract::{Path, Query},
    response::Json,
};

use crate::{
    auth::AthleteId,
    engine::SegmentEngine,
    errors::AppError,
    models::MatchedActivity,
    ranking::SortKey,
    series::{HeartRateZones, SeriesKind},
    types::{
        IndicesResponse, ListMatchesQuery, SegmentMetricsResponse, SeriesQuery, SeriesResponse,
        ToleranceQuery,
    },
};

/// Activities of the requesting athlete that traverse the segment.
#[utoipa::path(
    get,
    path = "/segments/{id}/activities",
    tag = "matches",
    params(("id" = i64, Path, description = "Segment ID"), ListMatchesQuery),
    responses(
        (status = 200, description = "Matched activities, ranked", body = Vec<MatchedActivity>),
        (status = 400, description = "Invalid tolerance"),
        (status = 403, description = "Segment belongs to another athlete"),
        (status = 404, description = "Segment not found")
    )
)]
pub async fn list_segment_activities(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path(id): Path<i64>,
    Query(query): Query<ListMatchesQuery>,
) -> Result<Json<Vec<MatchedActivity>>, AppError> {
    let sort = SortKey::parse_optional(query.sort.as_deref());
    let items = engine
        .list_matches(athlete_id, id, query.tolerance, sort, query.refresh)
        .await?;
    Ok(Json(items))
}

#[utoipa::path(
    get,
    path = "/segments/{id}/activity/{activity_id}/indices",
    tag = "matches",
    params(
        ("id" = i64, Path, description = "Segment ID"),
        ("activity_id" = i64, Path, description = "Activity ID"),
        ToleranceQuery
    ),
    responses(
        (status = 200, description = "Sample range covering the segment", body = IndicesResponse),
        (status = 404, description = "The activity does not traverse the segment")
    )
)]
pub async fn get_segment_indices(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path((id, activity_id)): Path<(i64, i64)>,
    Query(query): Query<ToleranceQuery>,
) -> Result<Json<IndicesResponse>, AppError> {
    let range = engine
        .resolve_indices(athlete_id, id, activity_id, query.tolerance)
        .await?;
    Ok(Json(range.into()))
}

#[utoipa::path(
    get,
    path = "/segments/{id}/activity/{activity_id}/metrics",
    tag = "matches",
    params(
        ("id" = i64, Path, description = "Segment ID"),
        ("activity_id" = i64, Path, description = "Activity ID"),
        ToleranceQuery
    ),
    responses(
        (status = 200, description = "Metrics over the segment", body = SegmentMetricsResponse),
        (status = 404, description = "The activity does not traverse the segment")
    )
)]
pub async fn get_segment_activity_metrics(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path((id, activity_id)): Path<(i64, i64)>,
    Query(query): Query<ToleranceQuery>,
) -> Result<Json<SegmentMetricsResponse>, AppError> {
    let metrics = engine
        .segment_activity_metrics(athlete_id, id, activity_id, query.tolerance)
        .await?;
    Ok(Json(metrics.into()))
}

#[utoipa::path(
    get,
    path = "/segments/{id}/activity/{activity_id}/series",
    tag = "matches",
    params(
        ("id" = i64, Path, description = "Segment ID"),
        ("activity_id" = i64, Path, description = "Activity ID"),
        SeriesQuery
    ),
    responses(
        (status = 200, description = "Per-sample series over the segment", body = SeriesResponse),
        (status = 400, description = "Unknown metric name or malformed heart rate zones"),
        (status = 404, description = "The activity does not traverse the segment")
    )
)]
pub async fn get_segment_series(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path((id, activity_id)): Path<(i64, i64)>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<SeriesResponse>, AppError> {
    let kinds = SeriesKind::parse_list(query.metrics.as_deref())?;
    let zones = HeartRateZones::parse(query.hr_zones.as_deref())?;
    let series = engine
        .segment_series(
            athlete_id,
            id,
            activity_id,
            query.tolerance,
            &kinds,
            zones.as_ref(),
        )
        .await?;
    Ok(Json(SeriesResponse {
        segment_id: id,
        activity_id,
        series,
    }))
}
