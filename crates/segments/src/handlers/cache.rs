//! Explicit cache invalidation.

use axum::{Extension, extract::Path, response::Json};

use crate::{
    auth::AthleteId, engine::SegmentEngine, errors::AppError, types::InvalidationResponse,
};

#[utoipa::path(
    post,
    path = "/cache/segments/{id}/invalidate",
    tag = "cache",
    params(("id" = i64, Path, description = "Segment ID")),
    responses(
        (status = 200, description = "Cached matches dropped", body = InvalidationResponse),
        (status = 403, description = "Segment belongs to another athlete"),
        (status = 404, description = "Segment not found")
    )
)]
pub async fn invalidate_segment(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path(id): Path<i64>,
) -> Result<Json<InvalidationResponse>, AppError> {
    let removed = engine.invalidate_segment(athlete_id, id).await?;
    Ok(Json(InvalidationResponse { removed }))
}

#[utoipa::path(
    post,
    path = "/cache/activities/{id}/invalidate",
    tag = "cache",
    params(("id" = i64, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Cached matches dropped", body = InvalidationResponse),
        (status = 403, description = "Activity belongs to another athlete"),
        (status = 404, description = "Activity not found")
    )
)]
pub async fn invalidate_activity(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path(id): Path<i64>,
) -> Result<Json<InvalidationResponse>, AppError> {
    let removed = engine.invalidate_activity(athlete_id, id).await?;
    Ok(Json(InvalidationResponse { removed }))
}
