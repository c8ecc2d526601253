use geo::{BoundingRect, Intersects, MultiPoint, Rect};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{
    errors::AppError,
    geo_primitives::{EARTH_RADIUS_M, path_length},
};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// The point `north_m` meters north and `east_m` meters east of this one
    /// (flat-earth approximation, fine for offsets of a few kilometers).
    pub fn offset(&self, north_m: f64, east_m: f64) -> Self {
        let lat = self.lat + (north_m / EARTH_RADIUS_M).to_degrees();
        let lon = self.lon + (east_m / (EARTH_RADIUS_M * self.lat.to_radians().cos())).to_degrees();
        Self { lat, lon }
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Point::new(p.lon, p.lat)
    }
}

/// Geographic bounding box defined by southwest and northeast corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Smallest box containing every point, or `None` for an empty input.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a GeoPoint>) -> Option<Self> {
        let points: MultiPoint<f64> = points.into_iter().map(|p| geo::Point::from(*p)).collect();
        points.bounding_rect().map(Self::from)
    }

    /// Grows the box by `meters` on every side.
    pub fn expand_by_meters(&self, meters: f64) -> Self {
        let d_lat = (meters / EARTH_RADIUS_M).to_degrees();
        // Use the latitude closest to a pole so the longitude margin is never too small.
        let worst_lat = self.min_lat.abs().max(self.max_lat.abs()).min(89.9);
        let d_lon = d_lat / worst_lat.to_radians().cos();
        Self {
            min_lat: (self.min_lat - d_lat).max(-90.0),
            min_lon: (self.min_lon - d_lon).max(-180.0),
            max_lat: (self.max_lat + d_lat).min(90.0),
            max_lon: (self.max_lon + d_lon).min(180.0),
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        Rect::from(*self).intersects(&Rect::from(*other))
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.lat)
            && (self.min_lon..=self.max_lon).contains(&p.lon)
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().y, rect.min().x, rect.max().y, rect.max().x)
    }
}

impl From<BoundingBox> for Rect<f64> {
    fn from(b: BoundingBox) -> Self {
        Rect::new(
            geo::coord! { x: b.min_lon, y: b.min_lat },
            geo::coord! { x: b.max_lon, y: b.max_lat },
        )
    }
}

/// One recorded sample of an activity's sensor stream.
///
/// Optional fields are absent when the source stream had no data at this
/// index. Aggregations must skip them rather than read them as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PointSample {
    pub index: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub location: Option<GeoPoint>,
    pub altitude: Option<f64>,
    pub heart_rate: Option<f64>,
    pub speed: Option<f64>,
    pub cadence: Option<f64>,
    pub grade: Option<f64>,
    pub moving: Option<bool>,
    /// Running path length from index 0, in meters.
    pub cumulative_distance: f64,
}

/// An activity's ordered point stream. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub activity_id: i64,
    pub athlete_id: i64,
    samples: Vec<PointSample>,
}

impl Route {
    /// Builds a route, checking that indices are `0..n` and that the
    /// cumulative distance never decreases.
    pub fn new(
        activity_id: i64,
        athlete_id: i64,
        mut samples: Vec<PointSample>,
    ) -> Result<Self, AppError> {
        samples.sort_by_key(|s| s.index);

        for (position, sample) in samples.iter().enumerate() {
            if sample.index != position {
                return Err(AppError::InvalidInput(format!(
                    "Activity {activity_id}: sample indices must be contiguous from 0 (expected {position}, got {})",
                    sample.index
                )));
            }
            if let Some(location) = sample.location
                && !location.is_valid()
            {
                return Err(AppError::InvalidInput(format!(
                    "Activity {activity_id}: invalid location at index {position}"
                )));
            }
        }

        if samples
            .windows(2)
            .any(|w| w[1].cumulative_distance < w[0].cumulative_distance)
        {
            return Err(AppError::InvalidInput(format!(
                "Activity {activity_id}: cumulative distance must be non-decreasing"
            )));
        }

        Ok(Self {
            activity_id,
            athlete_id,
            samples,
        })
    }

    pub fn samples(&self) -> &[PointSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Locations of the samples that have one, in index order.
    pub fn polyline(&self) -> Vec<GeoPoint> {
        self.samples.iter().filter_map(|s| s.location).collect()
    }

    /// Samples in `[start_index, end_index]`, or empty if the range lies outside the route.
    pub fn slice(&self, range: ResolvedRange) -> &[PointSample] {
        self.samples
            .get(range.start_index..=range.end_index)
            .unwrap_or(&[])
    }
}

/// Validated favorite-segment geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentGeometry {
    pub vertices: Vec<GeoPoint>,
    pub length_m: f64,
    pub elevation_gain_m: Option<f64>,
}

impl SegmentGeometry {
    /// Rejects polylines with fewer than two vertices or zero length.
    ///
    /// `altitudes`, when given, must have one entry per vertex. The elevation
    /// gain only counts pairs where both altitudes are known and is absent
    /// unless it ends up positive.
    pub fn new(vertices: Vec<GeoPoint>, altitudes: Option<&[Option<f64>]>) -> Result<Self, AppError> {
        if vertices.len() < 2 {
            return Err(AppError::InvalidInput(format!(
                "Segment needs at least 2 points (got {})",
                vertices.len()
            )));
        }
        if let Some(i) = vertices.iter().position(|v| !v.is_valid()) {
            return Err(AppError::InvalidInput(format!(
                "Segment point {i} is not a valid coordinate"
            )));
        }

        let length_m = path_length(&vertices);
        if length_m.is_nan() || length_m <= 0.0 {
            return Err(AppError::InvalidInput(
                "Segment must have a non-zero length".to_string(),
            ));
        }

        let elevation_gain_m = match altitudes {
            Some(alts) if alts.len() != vertices.len() => {
                return Err(AppError::InvalidInput(format!(
                    "Got {} altitudes for {} segment points",
                    alts.len(),
                    vertices.len()
                )));
            }
            Some(alts) => {
                let gain: f64 = alts
                    .windows(2)
                    .filter_map(|w| match (w[0], w[1]) {
                        (Some(a), Some(b)) if b > a => Some(b - a),
                        _ => None,
                    })
                    .sum();
                (gain > 0.0).then_some(gain)
            }
            None => None,
        };

        Ok(Self {
            vertices,
            length_m,
            elevation_gain_m,
        })
    }
}

/// A favorite segment, visible only to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Segment {
    pub id: i64,
    pub athlete_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub vertices: Vec<GeoPoint>,
    pub length_m: f64,
    pub elevation_gain_m: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Length and climb of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SegmentSummary {
    pub segment_id: i64,
    pub distance_m: f64,
    /// Zero when the vertex altitudes were unknown.
    pub elevation_gain_m: f64,
}

impl From<&Segment> for SegmentSummary {
    fn from(segment: &Segment) -> Self {
        Self {
            segment_id: segment.id,
            distance_m: segment.length_m,
            elevation_gain_m: segment.elevation_gain_m.unwrap_or(0.0),
        }
    }
}

/// Whole-activity summary. Ranking falls back to these averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActivitySummary {
    pub activity_id: i64,
    pub athlete_id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    pub elapsed_time_s: f64,
    pub average_heartrate: Option<f64>,
    pub average_speed: Option<f64>,
}

/// Scores for one route that covers a segment within a tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Match {
    pub activity_id: i64,
    /// Worst (largest) vertex-to-route distance.
    pub min_distance_m: f64,
    pub overlap_length_m: f64,
    pub overlap_percentage: f64,
}

impl Match {
    pub fn new(
        activity_id: i64,
        min_distance_m: f64,
        overlap_length_m: f64,
        segment_length_m: f64,
    ) -> Self {
        Self {
            activity_id,
            min_distance_m,
            overlap_length_m,
            overlap_percentage: overlap_percentage(overlap_length_m, segment_length_m),
        }
    }
}

/// `overlap / length * 100`, clamped to `[0, 100]`; zero for a zero-length segment.
pub fn overlap_percentage(overlap_length_m: f64, segment_length_m: f64) -> f64 {
    if segment_length_m > 0.0 && overlap_length_m.is_finite() {
        (overlap_length_m / segment_length_m * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Inclusive index span of a route that lies on a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedRange {
    pub start_index: usize,
    pub end_index: usize,
}

/// Performance over a resolved range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct SegmentMetrics {
    pub avg_hr: Option<f64>,
    pub avg_speed: Option<f64>,
    pub distance_m: f64,
    pub elevation_gain_m: f64,
}

/// Tolerances are keyed at micrometre precision so equal requests hit the same row.
fn tolerance_micros(tolerance_m: f64) -> i64 {
    (tolerance_m * 1_000_000.0).round() as i64
}

/// Key of the per-segment match list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListKey {
    pub segment_id: i64,
    tolerance_micros: i64,
}

impl ListKey {
    pub fn new(segment_id: i64, tolerance_m: f64) -> Self {
        Self {
            segment_id,
            tolerance_micros: tolerance_micros(tolerance_m),
        }
    }

    pub fn tolerance_m(&self) -> f64 {
        self.tolerance_micros as f64 / 1_000_000.0
    }
}

/// Key of one cache row: `(segment_id, activity_id, tolerance_meters)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub segment_id: i64,
    pub activity_id: i64,
    tolerance_micros: i64,
}

impl CacheKey {
    pub fn new(segment_id: i64, activity_id: i64, tolerance_m: f64) -> Self {
        Self {
            segment_id,
            activity_id,
            tolerance_micros: tolerance_micros(tolerance_m),
        }
    }

    pub fn tolerance_m(&self) -> f64 {
        self.tolerance_micros as f64 / 1_000_000.0
    }

    pub fn list_key(&self) -> ListKey {
        ListKey {
            segment_id: self.segment_id,
            tolerance_micros: self.tolerance_micros,
        }
    }
}

/// A cached match, optionally completed with its resolved range and metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub segment_id: i64,
    pub tolerance_meters: f64,
    pub matched: Match,
    pub range: Option<ResolvedRange>,
    pub metrics: Option<SegmentMetrics>,
    pub cached_at: OffsetDateTime,
}

impl CacheEntry {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(
            self.segment_id,
            self.matched.activity_id,
            self.tolerance_meters,
        )
    }

    /// True once both the range and the metrics have been stored.
    pub fn is_resolved(&self) -> bool {
        self.range.is_some() && self.metrics.is_some()
    }
}

/// One row of a segment's activity list.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MatchedActivity {
    pub activity_id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    pub elapsed_time_s: f64,
    pub min_distance_m: f64,
    pub overlap_length_m: f64,
    pub overlap_percentage: f64,
    pub segment_avg_hr: Option<f64>,
    pub segment_avg_speed: Option<f64>,
    pub segment_distance_m: Option<f64>,
    pub segment_elevation_gain_m: Option<f64>,
    /// Whole-activity averages.
    pub average_heartrate: Option<f64>,
    pub average_speed: Option<f64>,
}

impl MatchedActivity {
    pub fn new(entry: &CacheEntry, summary: &ActivitySummary) -> Self {
        let metrics = entry.metrics;
        Self {
            activity_id: summary.activity_id,
            name: summary.name.clone(),
            start_date: summary.start_date,
            elapsed_time_s: summary.elapsed_time_s,
            min_distance_m: entry.matched.min_distance_m,
            overlap_length_m: entry.matched.overlap_length_m,
            overlap_percentage: entry.matched.overlap_percentage,
            segment_avg_hr: metrics.and_then(|m| m.avg_hr),
            segment_avg_speed: metrics.and_then(|m| m.avg_speed),
            segment_distance_m: metrics.map(|m| m.distance_m),
            segment_elevation_gain_m: metrics.map(|m| m.elevation_gain_m),
            average_heartrate: summary.average_heartrate,
            average_speed: summary.average_speed,
        }
    }

    /// Whether segment-scoped metrics were cached for this activity.
    pub fn has_segment_metrics(&self) -> bool {
        self.segment_distance_m.is_some()
    }
}
