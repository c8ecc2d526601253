//! Athletic performance profiles.
//!
//! Profiles define realistic speeds, grade factors and heart rates for
//! different activity types. Route recorders use them to produce timestamps
//! and sensor streams.

mod cyclist;
mod runner;

use rand_distr::{Distribution, Normal};

pub use cyclist::CyclistProfile;
pub use runner::RunnerProfile;

/// Trait for athletic performance profiles.
pub trait AthleteProfile: Send + Sync {
    /// Base speed on flat terrain in meters per second.
    fn base_speed_mps(&self) -> f64;

    /// Speed multiplier for a given grade (expressed as a fraction, e.g., 0.05 = 5% grade).
    ///
    /// Below 1.0 means slower than base (uphill), above means faster (downhill).
    fn grade_factor(&self, grade: f64) -> f64;

    /// Day-to-day performance variance as a coefficient of variation (0.0 - 1.0).
    fn variance(&self) -> f64;

    /// Heart rate in bpm at an easy effort on flat ground.
    fn easy_heart_rate(&self) -> f64;

    fn max_heart_rate(&self) -> f64 {
        190.0
    }

    /// Steps or crank revolutions per minute.
    fn cadence(&self) -> f64;
}

pub fn speed_at_grade(profile: &dyn AthleteProfile, grade: f64, variance_factor: f64) -> f64 {
    let target = profile.base_speed_mps() * profile.grade_factor(grade);
    (target * variance_factor).max(0.5) // Minimum 0.5 m/s to avoid division issues
}

/// Heart rate for a given grade and day-to-day factor. Climbing and good
/// days both push it up, capped at the profile's maximum.
pub fn heart_rate_at(profile: &dyn AthleteProfile, grade: f64, variance_factor: f64) -> f64 {
    let climb = grade.clamp(-0.1, 0.2) * 250.0;
    let effort = (variance_factor - 1.0) * 60.0;
    (profile.easy_heart_rate() + climb + effort).clamp(60.0, profile.max_heart_rate())
}

/// Samples a variance factor from a normal distribution around 1.0.
pub fn sample_variance(profile: &dyn AthleteProfile, rng: &mut impl rand::Rng) -> f64 {
    match Normal::new(1.0, profile.variance()) {
        Ok(normal) if profile.variance() > 0.0 => normal.sample(rng).clamp(0.7, 1.4),
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heart_rate_rises_uphill() {
        let profile = RunnerProfile::default();
        let flat = heart_rate_at(&profile, 0.0, 1.0);
        let climb = heart_rate_at(&profile, 0.08, 1.0);
        assert_eq!(flat, profile.easy_heart_rate());
        assert!(climb > flat);
        assert!(heart_rate_at(&profile, 1.0, 1.4) <= profile.max_heart_rate());
    }

    #[test]
    fn test_variance_bounds() {
        let profile = CyclistProfile::default();
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let v = sample_variance(&profile, &mut rng);
            assert!((0.7..=1.4).contains(&v));
        }
    }
}
