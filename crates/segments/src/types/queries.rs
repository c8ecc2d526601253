//! Query parameter types for API endpoints.

use serde::Deserialize;
use utoipa::IntoParams;

/// Segment activity list query parameters.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMatchesQuery {
    /// Match tolerance in meters (defaults to the server setting)
    pub tolerance: Option<f64>,
    /// One of distance, avg_hr, avg_speed, total_time, date
    pub sort: Option<String>,
    /// Ignore a fresh cached list and rerun the matcher
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ToleranceQuery {
    /// Match tolerance in meters (defaults to the server setting)
    pub tolerance: Option<f64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SeriesQuery {
    pub tolerance: Option<f64>,
    /// Comma-separated subset of speed, heartrate, altitude, cadence (all when omitted)
    pub metrics: Option<String>,
    /// Heart-rate zones as comma-separated `min-max` pairs, lowest first.
    /// When set, heart-rate points carry their 1-based zone.
    pub hr_zones: Option<String>,
}
