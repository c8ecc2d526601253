//! Cyclist athletic profile.

use super::AthleteProfile;

/// Road cyclist: ~28 km/h on the flat, strongly slowed by climbs.
#[derive(Debug, Clone)]
pub struct CyclistProfile {
    /// Base speed in m/s on flat terrain.
    base_speed: f64,
    /// Performance variance (coefficient of variation).
    variance: f64,
    easy_heart_rate: f64,
}

impl Default for CyclistProfile {
    fn default() -> Self {
        Self {
            base_speed: 8.0, // ~28 km/h
            variance: 0.10,
            easy_heart_rate: 135.0,
        }
    }
}

impl CyclistProfile {
    pub fn with_speed(speed_kmh: f64) -> Self {
        Self {
            base_speed: speed_kmh / 3.6,
            ..Default::default()
        }
    }

    pub fn recreational() -> Self {
        Self {
            easy_heart_rate: 125.0,
            ..Self::with_speed(22.0)
        }
    }
}

impl AthleteProfile for CyclistProfile {
    fn base_speed_mps(&self) -> f64 {
        self.base_speed
    }

    fn grade_factor(&self, grade: f64) -> f64 {
        // Uphill: lose ~25% per 1% grade. Downhill: gain ~15% per 1% grade.
        if grade >= 0.0 {
            (1.0 - grade * 25.0).max(0.15)
        } else {
            (1.0 - grade * 15.0).min(2.5)
        }
    }

    fn variance(&self) -> f64 {
        self.variance
    }

    fn easy_heart_rate(&self) -> f64 {
        self.easy_heart_rate
    }

    fn max_heart_rate(&self) -> f64 {
        185.0
    }

    fn cadence(&self) -> f64 {
        88.0
    }
}
