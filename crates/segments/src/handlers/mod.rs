//! HTTP request handlers for the segments API.
//!
//! This module re-exports handlers from focused submodules organized by domain.

pub mod activities;
pub mod cache;
pub mod matches;
pub mod segments;
pub mod stats;

// Re-export handlers from submodules (including utoipa __path types for OpenAPI)
pub use activities::{__path_delete_activity, __path_ingest_activity, delete_activity, ingest_activity};
pub use cache::{
    __path_invalidate_activity, __path_invalidate_segment, invalidate_activity, invalidate_segment,
};
pub use matches::{
    __path_get_segment_activity_metrics, __path_get_segment_indices, __path_get_segment_series,
    __path_list_segment_activities, get_segment_activity_metrics, get_segment_indices,
    get_segment_series, list_segment_activities,
};
pub use segments::{
    __path_create_segment, __path_delete_segment, __path_get_segment, __path_get_segment_summary,
    __path_list_segments, __path_update_segment, create_segment, delete_segment, get_segment,
    get_segment_summary, list_segments, update_segment,
};
pub use stats::{__path_health_check, health_check};
