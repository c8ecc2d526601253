//! Segment management handlers.

use axum::{
    Extension,
    extract::Path,
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AthleteId,
    engine::SegmentEngine,
    errors::AppError,
    models::{Segment, SegmentSummary},
    types::SegmentRequest,
};

#[utoipa::path(
    get,
    path = "/segments",
    tag = "segments",
    responses(
        (status = 200, description = "Segments of the requesting athlete", body = Vec<Segment>),
        (status = 401, description = "Missing athlete header")
    )
)]
pub async fn list_segments(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
) -> Result<Json<Vec<Segment>>, AppError> {
    let segments = engine.list_segments(athlete_id).await?;
    Ok(Json(segments))
}

#[utoipa::path(
    post,
    path = "/segments",
    tag = "segments",
    request_body = SegmentRequest,
    responses(
        (status = 200, description = "Segment created", body = Segment),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Missing athlete header")
    )
)]
pub async fn create_segment(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Json(req): Json<SegmentRequest>,
) -> Result<Json<Segment>, AppError> {
    let segment = engine.create_segment(athlete_id, req.into()).await?;
    Ok(Json(segment))
}

#[utoipa::path(
    get,
    path = "/segments/{id}",
    tag = "segments",
    params(("id" = i64, Path, description = "Segment ID")),
    responses(
        (status = 200, description = "Segment", body = Segment),
        (status = 403, description = "Segment belongs to another athlete"),
        (status = 404, description = "Segment not found")
    )
)]
pub async fn get_segment(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path(id): Path<i64>,
) -> Result<Json<Segment>, AppError> {
    let segment = engine.get_segment(athlete_id, id).await?;
    Ok(Json(segment))
}

/// Replace a segment's name and geometry. Cached matches for it are dropped.
#[utoipa::path(
    put,
    path = "/segments/{id}",
    tag = "segments",
    params(("id" = i64, Path, description = "Segment ID")),
    request_body = SegmentRequest,
    responses(
        (status = 200, description = "Segment updated", body = Segment),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Segment belongs to another athlete"),
        (status = 404, description = "Segment not found")
    )
)]
pub async fn update_segment(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path(id): Path<i64>,
    Json(req): Json<SegmentRequest>,
) -> Result<Json<Segment>, AppError> {
    let segment = engine.update_segment(athlete_id, id, req.into()).await?;
    Ok(Json(segment))
}

#[utoipa::path(
    delete,
    path = "/segments/{id}",
    tag = "segments",
    params(("id" = i64, Path, description = "Segment ID")),
    responses(
        (status = 204, description = "Segment deleted"),
        (status = 403, description = "Segment belongs to another athlete"),
        (status = 404, description = "Segment not found")
    )
)]
pub async fn delete_segment(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    engine.delete_segment(athlete_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Length and elevation gain of the segment itself.
#[utoipa::path(
    get,
    path = "/segments/{id}/metrics",
    tag = "segments",
    params(("id" = i64, Path, description = "Segment ID")),
    responses(
        (status = 200, description = "Segment summary", body = SegmentSummary),
        (status = 403, description = "Segment belongs to another athlete"),
        (status = 404, description = "Segment not found")
    )
)]
pub async fn get_segment_summary(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path(id): Path<i64>,
) -> Result<Json<SegmentSummary>, AppError> {
    let summary = engine.segment_summary(athlete_id, id).await?;
    Ok(Json(summary))
}
