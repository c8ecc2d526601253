//! Activity upload and removal.

use axum::{
    Extension,
    extract::Path,
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AthleteId,
    engine::{NewActivity, SegmentEngine},
    errors::AppError,
    models::ActivitySummary,
    types::NewActivityRequest,
};

/// Store an activity. Uploading an existing id replaces it.
#[utoipa::path(
    post,
    path = "/activities",
    tag = "activities",
    request_body = NewActivityRequest,
    responses(
        (status = 200, description = "Activity stored", body = ActivitySummary),
        (status = 400, description = "Invalid samples"),
        (status = 403, description = "Activity id belongs to another athlete")
    )
)]
pub async fn ingest_activity(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Json(req): Json<NewActivityRequest>,
) -> Result<Json<ActivitySummary>, AppError> {
    let activity = NewActivity::try_from(req)?;
    let summary = engine.ingest_activity(athlete_id, activity).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    delete,
    path = "/activities/{id}",
    tag = "activities",
    params(("id" = i64, Path, description = "Activity ID")),
    responses(
        (status = 204, description = "Activity deleted"),
        (status = 403, description = "Activity belongs to another athlete"),
        (status = 404, description = "Activity not found")
    )
)]
pub async fn delete_activity(
    Extension(engine): Extension<SegmentEngine>,
    AthleteId(athlete_id): AthleteId,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    engine.delete_activity(athlete_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
