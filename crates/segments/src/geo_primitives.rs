//! Geodesic building blocks for matching.
//!
//! Distances are great-circle (haversine) meters. Buffer clipping runs on a
//! local equirectangular projection in meters, which is exact enough for
//! tolerances of a few hundred meters, and the clipped share is scaled back
//! onto the haversine length of the polyline.

use geo::{
    BooleanOps, BoundingRect, Buffer, Closest, Coord, Distance as _, Euclidean, Haversine,
    HaversineClosestPoint, Intersects, Length as _, LineString, MapCoords, MultiLineString, Rect,
    coord,
};

use crate::models::{BoundingBox, GeoPoint};

/// Mean earth radius used by `geo`'s haversine.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

const EPSILON: f64 = 1e-9;

/// Buffering needs a positive width, so a zero tolerance still keeps lines
/// lying on the route.
const MIN_BUFFER_M: f64 = 1e-3;

/// Great-circle distance in meters.
pub fn haversine(a: GeoPoint, b: GeoPoint) -> f64 {
    Haversine.distance(geo::Point::from(a), geo::Point::from(b))
}

/// Sum of the haversine lengths of consecutive pairs.
pub fn path_length(points: &[GeoPoint]) -> f64 {
    points.windows(2).map(|w| haversine(w[0], w[1])).sum()
}

/// `points` as a lon/lat line string.
pub fn line_string(points: &[GeoPoint]) -> LineString<f64> {
    points.iter().map(|p| geo::Point::from(*p)).collect()
}

/// The operations the matcher and resolver need from a geometry backend.
pub trait GeoPrimitives: Send + Sync {
    /// Distance between two points in meters.
    fn distance(&self, a: GeoPoint, b: GeoPoint) -> f64;

    /// Distance from `point` to the closest point of `polyline`.
    /// `f64::INFINITY` for an empty polyline.
    fn distance_point_to_polyline(&self, point: GeoPoint, polyline: &[GeoPoint]) -> f64;

    fn within_tolerance(&self, point: GeoPoint, polyline: &[GeoPoint], tolerance_m: f64) -> bool {
        self.distance_point_to_polyline(point, polyline) <= tolerance_m
    }

    /// Length of `polyline` lying inside the `tolerance_m` buffer around `route`.
    fn intersection_length(&self, route: &[GeoPoint], tolerance_m: f64, polyline: &[GeoPoint])
    -> f64;

    fn bounding_box(&self, polyline: &[GeoPoint]) -> Option<BoundingBox> {
        line_string(polyline).bounding_rect().map(BoundingBox::from)
    }
}

/// Haversine-based implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeodesicPrimitives;

impl GeoPrimitives for GeodesicPrimitives {
    fn distance(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        haversine(a, b)
    }

    fn distance_point_to_polyline(&self, point: GeoPoint, polyline: &[GeoPoint]) -> f64 {
        match polyline {
            [] => f64::INFINITY,
            [only] => haversine(point, *only),
            _ => {
                let from = geo::Point::from(point);
                match line_string(polyline).haversine_closest_point(&from) {
                    Closest::Intersection(p) | Closest::SinglePoint(p) => {
                        Haversine.distance(p, from)
                    }
                    Closest::Indeterminate => f64::INFINITY,
                }
            }
        }
    }

    fn intersection_length(
        &self,
        route: &[GeoPoint],
        tolerance_m: f64,
        polyline: &[GeoPoint],
    ) -> f64 {
        if polyline.len() < 2 || route.is_empty() || !tolerance_m.is_finite() || tolerance_m < 0.0
        {
            return 0.0;
        }
        let subject = line_string(polyline);
        let Some(bounds) = subject.bounding_rect() else {
            return 0.0;
        };

        let projection = LocalProjection::at(bounds.center());
        let subject = subject.map_coords(|c| projection.project(c));
        let projected_length = Euclidean.length(&subject);
        if projected_length <= EPSILON {
            return 0.0;
        }
        let width = tolerance_m.max(MIN_BUFFER_M);
        let Some(reach) = subject.bounding_rect().map(|r| grow(r, width)) else {
            return 0.0;
        };

        let route = line_string(route).map_coords(|c| projection.project(c));
        let nearby = runs_near(&route, &reach);
        if nearby.0.is_empty() {
            return 0.0;
        }

        let inside = nearby
            .buffer(width)
            .clip(&MultiLineString::new(vec![subject]), false);
        let share = (Euclidean.length(&inside) / projected_length).clamp(0.0, 1.0);
        share * path_length(polyline)
    }
}

/// Equirectangular projection to meters around an origin.
#[derive(Debug, Clone, Copy)]
struct LocalProjection {
    origin: Coord<f64>,
    cos_lat: f64,
}

impl LocalProjection {
    fn at(origin: Coord<f64>) -> Self {
        Self {
            origin,
            cos_lat: origin.y.to_radians().cos().max(EPSILON),
        }
    }

    fn project(&self, c: Coord<f64>) -> Coord<f64> {
        let mut d_lon = c.x - self.origin.x;
        if d_lon > 180.0 {
            d_lon -= 360.0;
        } else if d_lon < -180.0 {
            d_lon += 360.0;
        }
        coord! {
            x: d_lon.to_radians() * EARTH_RADIUS_M * self.cos_lat,
            y: (c.y - self.origin.y).to_radians() * EARTH_RADIUS_M,
        }
    }
}

fn grow(rect: Rect<f64>, by: f64) -> Rect<f64> {
    Rect::new(
        coord! { x: rect.min().x - by, y: rect.min().y - by },
        coord! { x: rect.max().x + by, y: rect.max().y + by },
    )
}

/// Consecutive runs of `route` edges whose boxes touch `reach`. A single
/// point route is kept whole and buffers as a disc.
fn runs_near(route: &LineString<f64>, reach: &Rect<f64>) -> MultiLineString<f64> {
    if route.0.len() == 1 {
        return MultiLineString::new(vec![route.clone()]);
    }

    let mut runs = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();
    for edge in route.lines() {
        if edge.bounding_rect().intersects(reach) {
            if current.is_empty() {
                current.push(edge.start);
            }
            current.push(edge.end);
        } else if !current.is_empty() {
            runs.push(LineString::new(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        runs.push(LineString::new(current));
    }
    MultiLineString::new(runs)
}
