use crate::{
    geo_primitives::GeoPrimitives,
    models::{GeoPoint, PointSample, ResolvedRange, Route},
};

/// First and last sample indices whose location is within `tolerance_m` of
/// the segment polyline.
///
/// Samples in between are part of the range whether or not they are on the
/// segment themselves, so a short GPS dropout does not split a pass in two.
/// `None` when no located sample is within tolerance, which can happen for a
/// sparse route even after a polyline-level match.
pub fn resolve_range(
    geo: &dyn GeoPrimitives,
    segment_vertices: &[GeoPoint],
    route: &Route,
    tolerance_m: f64,
) -> Option<ResolvedRange> {
    let on_segment = |sample: &&PointSample| {
        sample
            .location
            .is_some_and(|p| geo.within_tolerance(p, segment_vertices, tolerance_m))
    };

    let start = route.samples().iter().find(on_segment)?;
    let end = route.samples().iter().rev().find(on_segment)?;

    Some(ResolvedRange {
        start_index: start.index,
        end_index: end.index,
    })
}
