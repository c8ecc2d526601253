use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::{errors::AppError, models::MatchedActivity};

/// Ordering applied to a segment's activity list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Tightest fit first.
    #[default]
    Distance,
    AvgHr,
    AvgSpeed,
    TotalTime,
    Date,
}

impl SortKey {
    /// Missing, blank or unknown input means the default.
    pub fn parse_optional(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::default(),
            Some(key) => key.parse().unwrap_or_else(|_| {
                debug!(sort = key, "Unknown sort key, ranking by distance");
                Self::default()
            }),
        }
    }
}

impl FromStr for SortKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "distance" => Ok(SortKey::Distance),
            "avg_hr" => Ok(SortKey::AvgHr),
            "avg_speed" => Ok(SortKey::AvgSpeed),
            "total_time" => Ok(SortKey::TotalTime),
            "date" => Ok(SortKey::Date),
            other => Err(AppError::InvalidInput(format!("Unknown sort key: {other}"))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortKey::Distance => "distance",
            SortKey::AvgHr => "avg_hr",
            SortKey::AvgSpeed => "avg_speed",
            SortKey::TotalTime => "total_time",
            SortKey::Date => "date",
        };
        f.write_str(name)
    }
}

/// Heart rate used for ranking. Segment-scoped when that activity has cached
/// segment metrics, otherwise the whole-activity average. Never a mix.
fn ranking_hr(item: &MatchedActivity) -> Option<f64> {
    if item.has_segment_metrics() {
        item.segment_avg_hr
    } else {
        item.average_heartrate
    }
}

fn ranking_speed(item: &MatchedActivity) -> Option<f64> {
    if item.has_segment_metrics() {
        item.segment_avg_speed
    } else {
        item.average_speed
    }
}

/// Descending, with missing values last.
fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Fixed tie-break so equal primary keys always come out in the same order.
fn tie_break(a: &MatchedActivity, b: &MatchedActivity) -> Ordering {
    a.min_distance_m
        .total_cmp(&b.min_distance_m)
        .then_with(|| b.overlap_percentage.total_cmp(&a.overlap_percentage))
        .then_with(|| b.start_date.cmp(&a.start_date))
        .then_with(|| a.activity_id.cmp(&b.activity_id))
}

pub fn compare(key: SortKey, a: &MatchedActivity, b: &MatchedActivity) -> Ordering {
    let primary = match key {
        SortKey::Distance => Ordering::Equal,
        SortKey::AvgHr => descending(ranking_hr(a), ranking_hr(b)),
        SortKey::AvgSpeed => descending(ranking_speed(a), ranking_speed(b)),
        SortKey::TotalTime => b.elapsed_time_s.total_cmp(&a.elapsed_time_s),
        SortKey::Date => b.start_date.cmp(&a.start_date),
    };
    primary.then_with(|| tie_break(a, b))
}

pub fn rank(mut items: Vec<MatchedActivity>, key: SortKey) -> Vec<MatchedActivity> {
    items.sort_by(|a, b| compare(key, a, b));
    items
}
