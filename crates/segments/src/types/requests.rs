//! Request body types for API endpoints.

use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{
    engine::{NewActivity, SegmentDraft},
    errors::AppError,
    geo_primitives::haversine,
    models::{GeoPoint, PointSample},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SegmentPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f64>,
}

/// Body of segment create and update.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SegmentRequest {
    pub name: String,
    pub description: Option<String>,
    pub points: Vec<SegmentPoint>,
}

impl From<SegmentRequest> for SegmentDraft {
    fn from(req: SegmentRequest) -> Self {
        let altitudes = req
            .points
            .iter()
            .any(|p| p.ele.is_some())
            .then(|| req.points.iter().map(|p| p.ele).collect());
        SegmentDraft {
            name: req.name,
            description: req.description.filter(|d| !d.trim().is_empty()),
            vertices: req.points.iter().map(|p| GeoPoint::new(p.lat, p.lon)).collect(),
            altitudes,
        }
    }
}

/// One sample of an uploaded activity. Its index is its position in the list.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SampleRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub altitude: Option<f64>,
    pub heart_rate: Option<f64>,
    pub speed: Option<f64>,
    pub cadence: Option<f64>,
    pub grade: Option<f64>,
    pub moving: Option<bool>,
    /// Running path length in meters. Derived from the locations when any sample omits it.
    pub cumulative_distance: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewActivityRequest {
    pub activity_id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    pub elapsed_time_s: f64,
    pub average_heartrate: Option<f64>,
    pub average_speed: Option<f64>,
    pub samples: Vec<SampleRequest>,
}

impl TryFrom<NewActivityRequest> for NewActivity {
    type Error = AppError;

    fn try_from(req: NewActivityRequest) -> Result<Self, Self::Error> {
        let derive_distance = req.samples.iter().any(|s| s.cumulative_distance.is_none());

        let mut samples = Vec::with_capacity(req.samples.len());
        let mut running = 0.0;
        let mut last_location: Option<GeoPoint> = None;
        for (index, s) in req.samples.into_iter().enumerate() {
            let location = match (s.lat, s.lon) {
                (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
                (None, None) => None,
                _ => {
                    return Err(AppError::InvalidInput(format!(
                        "Sample {index} has only one of lat/lon"
                    )));
                }
            };
            if let Some(here) = location {
                running += last_location.map_or(0.0, |prev| haversine(prev, here));
                last_location = Some(here);
            }
            samples.push(PointSample {
                index,
                timestamp: s.timestamp,
                location,
                altitude: s.altitude,
                heart_rate: s.heart_rate,
                speed: s.speed,
                cadence: s.cadence,
                grade: s.grade,
                moving: s.moving,
                cumulative_distance: match s.cumulative_distance {
                    Some(d) if !derive_distance => d,
                    _ => running,
                },
            });
        }

        Ok(NewActivity {
            activity_id: req.activity_id,
            name: req.name,
            start_date: req.start_date,
            elapsed_time_s: req.elapsed_time_s,
            average_heartrate: req.average_heartrate,
            average_speed: req.average_speed,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample(lat: Option<f64>, lon: Option<f64>, cumulative_distance: Option<f64>) -> SampleRequest {
        SampleRequest {
            timestamp: datetime!(2024-05-01 08:00 UTC),
            lat,
            lon,
            altitude: None,
            heart_rate: None,
            speed: None,
            cadence: None,
            grade: None,
            moving: None,
            cumulative_distance,
        }
    }

    fn request(samples: Vec<SampleRequest>) -> NewActivityRequest {
        NewActivityRequest {
            activity_id: 3,
            name: "Lunch run".into(),
            start_date: datetime!(2024-05-01 08:00 UTC),
            elapsed_time_s: 1800.0,
            average_heartrate: None,
            average_speed: None,
            samples,
        }
    }

    #[test]
    fn test_cumulative_distance_derived_when_missing() {
        let activity = NewActivity::try_from(request(vec![
            sample(Some(0.0), Some(0.0), Some(0.0)),
            sample(None, None, None),
            sample(Some(0.001), Some(0.0), Some(5.0)),
        ]))
        .unwrap();

        let distances: Vec<f64> = activity
            .samples
            .iter()
            .map(|s| s.cumulative_distance)
            .collect();
        assert_eq!(distances[0], 0.0);
        assert_eq!(distances[1], 0.0);
        assert!((distances[2] - 111.2).abs() < 0.1);
    }

    #[test]
    fn test_half_location_rejected() {
        let err = NewActivity::try_from(request(vec![sample(Some(1.0), None, None)])).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_segment_request_altitudes() {
        let req = SegmentRequest {
            name: "Climb".into(),
            description: Some("  ".into()),
            points: vec![
                SegmentPoint { lat: 1.0, lon: 1.0, ele: Some(10.0) },
                SegmentPoint { lat: 1.001, lon: 1.0, ele: None },
            ],
        };
        let draft = SegmentDraft::from(req);
        assert_eq!(draft.altitudes, Some(vec![Some(10.0), None]));
        assert_eq!(draft.description, None);
    }
}
