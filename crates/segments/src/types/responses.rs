//! Response types for API endpoints.

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    models::{ResolvedRange, SegmentMetrics},
    series::Series,
};

/// Metrics of one activity over a segment. Averages the activity had no
/// data for are reported as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct SegmentMetricsResponse {
    pub avg_hr: f64,
    pub avg_speed: f64,
    pub distance_m: f64,
    pub elevation_gain_m: f64,
}

impl From<SegmentMetrics> for SegmentMetricsResponse {
    fn from(m: SegmentMetrics) -> Self {
        Self {
            avg_hr: m.avg_hr.unwrap_or(0.0),
            avg_speed: m.avg_speed.unwrap_or(0.0),
            distance_m: m.distance_m,
            elevation_gain_m: m.elevation_gain_m,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SeriesResponse {
    pub segment_id: i64,
    pub activity_id: i64,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct InvalidationResponse {
    /// Cache rows removed.
    pub removed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct IndicesResponse {
    pub start_index: usize,
    pub end_index: usize,
}

impl From<ResolvedRange> for IndicesResponse {
    fn from(range: ResolvedRange) -> Self {
        Self {
            start_index: range.start_index,
            end_index: range.end_index,
        }
    }
}
