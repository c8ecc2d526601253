//! Per-sample series over a resolved range, for charting a segment pass.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{
    errors::AppError,
    models::{PointSample, ResolvedRange, Route},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Speed,
    Heartrate,
    Altitude,
    Cadence,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 4] = [
        SeriesKind::Speed,
        SeriesKind::Heartrate,
        SeriesKind::Altitude,
        SeriesKind::Cadence,
    ];

    fn value(self, sample: &PointSample) -> Option<f64> {
        match self {
            SeriesKind::Speed => sample.speed,
            SeriesKind::Heartrate => sample.heart_rate,
            SeriesKind::Altitude => sample.altitude,
            SeriesKind::Cadence => sample.cadence,
        }
    }

    /// Parses a comma-separated list. Empty input selects every series.
    pub fn parse_list(raw: Option<&str>) -> Result<Vec<SeriesKind>, AppError> {
        let raw = raw.unwrap_or("").trim();
        if raw.is_empty() {
            return Ok(Self::ALL.to_vec());
        }
        let mut kinds = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let kind = part.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}

impl FromStr for SeriesKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speed" => Ok(SeriesKind::Speed),
            "heartrate" => Ok(SeriesKind::Heartrate),
            "altitude" => Ok(SeriesKind::Altitude),
            "cadence" => Ok(SeriesKind::Cadence),
            other => Err(AppError::InvalidInput(format!("Unknown metric: {other}"))),
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeriesKind::Speed => "speed",
            SeriesKind::Heartrate => "heartrate",
            SeriesKind::Altitude => "altitude",
            SeriesKind::Cadence => "cadence",
        };
        f.write_str(name)
    }
}

/// Inclusive heart-rate bounds of one training zone. A negative `max`
/// leaves the zone open at the top.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HrZone {
    pub min: f64,
    pub max: f64,
}

/// An athlete's heart-rate zones, lowest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HeartRateZones {
    zones: Vec<HrZone>,
}

impl HeartRateZones {
    /// Zones must be non-empty, ordered by `min` and no more than 255.
    pub fn new(zones: Vec<HrZone>) -> Result<Self, AppError> {
        if zones.is_empty() || zones.len() > usize::from(u8::MAX) {
            return Err(AppError::InvalidInput(format!(
                "Expected 1 to 255 heart rate zones, got {}",
                zones.len()
            )));
        }
        for zone in &zones {
            let open = zone.max < 0.0;
            if !zone.min.is_finite() || !zone.max.is_finite() || (!open && zone.max < zone.min) {
                return Err(AppError::InvalidInput(format!(
                    "Invalid heart rate zone {}-{}",
                    zone.min, zone.max
                )));
            }
        }
        if zones.windows(2).any(|w| w[1].min < w[0].min) {
            return Err(AppError::InvalidInput(
                "Heart rate zones must be ordered by their lower bound".to_string(),
            ));
        }
        Ok(Self { zones })
    }

    /// Parses `min-max` pairs separated by commas, e.g. `0-120,121-150,151-250`.
    /// A missing or blank value means no zones.
    pub fn parse(raw: Option<&str>) -> Result<Option<Self>, AppError> {
        let raw = raw.unwrap_or("").trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let zones = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|part| {
                let bad = || AppError::InvalidInput(format!("Invalid heart rate zone: {part}"));
                let (min, max) = part.split_once('-').ok_or_else(bad)?;
                Ok(HrZone {
                    min: min.trim().parse().map_err(|_| bad())?,
                    max: max.trim().parse().map_err(|_| bad())?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        Self::new(zones).map(Some)
    }

    pub fn zones(&self) -> &[HrZone] {
        &self.zones
    }

    /// 1-based zone holding `hr`. Values above every zone count as the top
    /// zone, values below the first as zone 1.
    pub fn zone_of(&self, hr: f64) -> u8 {
        let within = self
            .zones
            .iter()
            .position(|z| hr >= z.min && (z.max < 0.0 || hr <= z.max));
        let index = within.unwrap_or_else(|| {
            // Falls between or outside the bounds: the highest zone started below it.
            self.zones
                .iter()
                .rposition(|z| hr >= z.min)
                .unwrap_or(0)
        });
        // `new` caps the zone count at 255.
        u8::try_from(index + 1).unwrap_or(u8::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SeriesPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub value: f64,
    pub distance_m: f64,
    /// Heart-rate zone of this sample, when zones were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Series {
    pub metric: SeriesKind,
    pub points: Vec<SeriesPoint>,
}

/// One series per requested kind. Samples missing the field are left out of
/// that series only. Heart-rate points carry their zone when `zones` is given.
pub fn extract(
    route: &Route,
    range: ResolvedRange,
    kinds: &[SeriesKind],
    zones: Option<&HeartRateZones>,
) -> Vec<Series> {
    let samples = route.slice(range);
    kinds
        .iter()
        .map(|&kind| {
            let zones = zones.filter(|_| kind == SeriesKind::Heartrate);
            Series {
                metric: kind,
                points: samples
                    .iter()
                    .filter_map(|s| {
                        kind.value(s).map(|value| SeriesPoint {
                            timestamp: s.timestamp,
                            value,
                            distance_m: s.cumulative_distance,
                            zone: zones.map(|z| z.zone_of(value)),
                        })
                    })
                    .collect(),
            }
        })
        .collect()
}
