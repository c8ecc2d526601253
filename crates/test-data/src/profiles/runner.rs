//! Runner athletic profile.

use super::AthleteProfile;

/// Recreational to competitive runner.
///
/// - Base pace: ~5:00/km (3.5 m/s)
/// - Uphill: ~15% slower per 1% grade
/// - Downhill: ~8% faster per 1% grade, capped
#[derive(Debug, Clone)]
pub struct RunnerProfile {
    /// Base speed in m/s on flat terrain.
    base_speed: f64,
    /// Performance variance (coefficient of variation).
    variance: f64,
    easy_heart_rate: f64,
}

impl Default for RunnerProfile {
    fn default() -> Self {
        Self {
            base_speed: 3.5, // ~5:00/km
            variance: 0.08,
            easy_heart_rate: 145.0,
        }
    }
}

impl RunnerProfile {
    /// Profile with the given flat pace in minutes per kilometer.
    pub fn with_pace(pace_min_per_km: f64) -> Self {
        Self {
            base_speed: 1000.0 / (pace_min_per_km * 60.0),
            ..Default::default()
        }
    }

    pub fn elite() -> Self {
        Self {
            easy_heart_rate: 135.0,
            ..Self::with_pace(3.5)
        }
    }

    pub fn recreational() -> Self {
        Self {
            easy_heart_rate: 150.0,
            ..Self::with_pace(6.0)
        }
    }
}

impl AthleteProfile for RunnerProfile {
    fn base_speed_mps(&self) -> f64 {
        self.base_speed
    }

    fn grade_factor(&self, grade: f64) -> f64 {
        if grade >= 0.0 {
            (1.0 - grade * 15.0).max(0.2)
        } else {
            (1.0 - grade * 8.0).min(1.5)
        }
    }

    fn variance(&self) -> f64 {
        self.variance
    }

    fn easy_heart_rate(&self) -> f64 {
        self.easy_heart_rate
    }

    fn cadence(&self) -> f64 {
        172.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = RunnerProfile::default();
        assert!((profile.base_speed_mps() - 3.5).abs() < 0.01);
        assert!(RunnerProfile::elite().base_speed_mps() > RunnerProfile::recreational().base_speed_mps());
    }

    #[test]
    fn test_grade_factors() {
        let profile = RunnerProfile::default();
        assert!((profile.grade_factor(0.0) - 1.0).abs() < 0.01);
        assert!(profile.grade_factor(0.05) < 1.0);
        assert!(profile.grade_factor(-0.05) > 1.0);
    }
}
