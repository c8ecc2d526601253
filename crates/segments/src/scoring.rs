use crate::{
    geo_primitives::GeoPrimitives,
    models::{GeoPoint, PointSample, ResolvedRange, Route, SegmentMetrics},
};

pub trait SampleMetric {
    type Score;
    fn next_sample(&mut self, sample: &PointSample);
    fn finish(&mut self) -> Self::Score;
}

/// Aggregates the samples of `route` inside `range`.
pub fn aggregate(geo: &dyn GeoPrimitives, route: &Route, range: ResolvedRange) -> SegmentMetrics {
    let mut acc = Metrics::new(geo);

    for sample in route.slice(range) {
        acc.next_sample(sample);
    }

    acc.finish()
}

struct Metrics<'a> {
    heart_rate: MeanMetric,
    speed: MeanMetric,
    distance: DistanceMetric<'a>,
    elevation_gain: ElevationGainMetric,
}

impl<'a> Metrics<'a> {
    fn new(geo: &'a dyn GeoPrimitives) -> Self {
        Self {
            heart_rate: MeanMetric::new(|s| s.heart_rate),
            speed: MeanMetric::new(|s| s.speed),
            distance: DistanceMetric::new(geo),
            elevation_gain: ElevationGainMetric::default(),
        }
    }
}

impl SampleMetric for Metrics<'_> {
    type Score = SegmentMetrics;

    fn next_sample(&mut self, sample: &PointSample) {
        self.heart_rate.next_sample(sample);
        self.speed.next_sample(sample);
        self.distance.next_sample(sample);
        self.elevation_gain.next_sample(sample);
    }

    fn finish(&mut self) -> SegmentMetrics {
        SegmentMetrics {
            avg_hr: self.heart_rate.finish(),
            avg_speed: self.speed.finish(),
            distance_m: self.distance.finish(),
            elevation_gain_m: self.elevation_gain.finish(),
        }
    }
}

/// Mean of an optional field; samples without it count neither way.
struct MeanMetric {
    field: fn(&PointSample) -> Option<f64>,
    sum: f64,
    count: usize,
}

impl MeanMetric {
    fn new(field: fn(&PointSample) -> Option<f64>) -> Self {
        Self {
            field,
            sum: 0.0,
            count: 0,
        }
    }
}

impl SampleMetric for MeanMetric {
    type Score = Option<f64>;

    fn next_sample(&mut self, sample: &PointSample) {
        if let Some(value) = (self.field)(sample).filter(|v| v.is_finite()) {
            self.sum += value;
            self.count += 1;
        }
    }

    fn finish(&mut self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Path length between located samples. Unlocated samples are skipped and
/// the next leg is measured from the last known location.
struct DistanceMetric<'a> {
    geo: &'a dyn GeoPrimitives,
    total_distance: f64,
    last_location: Option<GeoPoint>,
}

impl<'a> DistanceMetric<'a> {
    fn new(geo: &'a dyn GeoPrimitives) -> Self {
        Self {
            geo,
            total_distance: 0.0,
            last_location: None,
        }
    }
}

impl SampleMetric for DistanceMetric<'_> {
    type Score = f64;

    fn next_sample(&mut self, sample: &PointSample) {
        if let Some(location) = sample.location {
            self.total_distance += self
                .last_location
                .map_or(0.0, |prev| self.geo.distance(prev, location));
            self.last_location = Some(location);
        }
    }

    fn finish(&mut self) -> f64 {
        self.total_distance
    }
}

/// Positive altitude deltas between adjacent samples. A sample without
/// altitude breaks the chain, so both pairs around it contribute nothing.
#[derive(Debug, Clone, Default)]
struct ElevationGainMetric {
    total_gain: f64,
    last_altitude: Option<f64>,
}

impl SampleMetric for ElevationGainMetric {
    type Score = f64;

    fn next_sample(&mut self, sample: &PointSample) {
        if let (Some(altitude), Some(last)) = (sample.altitude, self.last_altitude) {
            let gain = altitude - last;
            if gain > 0.0 {
                self.total_gain += gain;
            }
        }
        self.last_altitude = sample.altitude;
    }

    fn finish(&mut self) -> f64 {
        self.total_gain
    }
}
