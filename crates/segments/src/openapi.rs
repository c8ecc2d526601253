//! OpenAPI document served at `/api-docs/openapi.json` with Swagger UI at `/swagger-ui`.

use utoipa::OpenApi;

use crate::{
    handlers,
    models::{ActivitySummary, GeoPoint, MatchedActivity, Segment, SegmentSummary},
    ranking::SortKey,
    series::{HeartRateZones, HrZone, Series, SeriesKind, SeriesPoint},
    types::{
        IndicesResponse, InvalidationResponse, NewActivityRequest, SampleRequest,
        SegmentMetricsResponse, SegmentPoint, SegmentRequest, SeriesResponse,
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Segments API",
        description = "Favorite segments and the activities that traverse them"
    ),
    paths(
        handlers::health_check,
        handlers::list_segments,
        handlers::create_segment,
        handlers::get_segment,
        handlers::update_segment,
        handlers::delete_segment,
        handlers::get_segment_summary,
        handlers::list_segment_activities,
        handlers::get_segment_indices,
        handlers::get_segment_activity_metrics,
        handlers::get_segment_series,
        handlers::ingest_activity,
        handlers::delete_activity,
        handlers::invalidate_segment,
        handlers::invalidate_activity,
    ),
    components(schemas(
        ActivitySummary,
        GeoPoint,
        IndicesResponse,
        InvalidationResponse,
        MatchedActivity,
        NewActivityRequest,
        SampleRequest,
        Segment,
        SegmentMetricsResponse,
        SegmentPoint,
        SegmentRequest,
        SegmentSummary,
        Series,
        SeriesKind,
        SeriesPoint,
        HrZone,
        HeartRateZones,
        SeriesResponse,
        SortKey,
    )),
    tags(
        (name = "segments", description = "Favorite segment management"),
        (name = "matches", description = "Activities matched to a segment"),
        (name = "activities", description = "Activity upload"),
        (name = "cache", description = "Match cache invalidation"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/segments",
            "/segments/{id}/activities",
            "/segments/{id}/activity/{activity_id}/metrics",
            "/cache/activities/{id}/invalidate",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
