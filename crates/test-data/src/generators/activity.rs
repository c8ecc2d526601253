//! Activity generation from recorded samples.

use rand::{Rng, seq::SliceRandom};
use segments::{engine::NewActivity, models::PointSample};

/// Name parts for generated activities.
#[derive(Debug, Clone)]
pub struct ActivityNameConfig {
    pub prefixes: Vec<String>,
    pub location_suffixes: Vec<String>,
}

impl Default for ActivityNameConfig {
    fn default() -> Self {
        Self {
            prefixes: vec![
                "Morning Run".into(),
                "Evening Run".into(),
                "Tempo Run".into(),
                "Long Run".into(),
                "Road Ride".into(),
                "Gravel Ride".into(),
            ],
            location_suffixes: vec![
                "on the Flatirons".into(),
                "at the Mesa".into(),
                "by the Lake".into(),
                "through the Park".into(),
            ],
        }
    }
}

/// Turns recorded samples into uploadable activities.
#[derive(Debug, Clone, Default)]
pub struct ActivityGenerator {
    name_config: ActivityNameConfig,
}

impl ActivityGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an activity with whole-activity averages computed from the samples.
    pub fn from_samples(
        &self,
        activity_id: i64,
        samples: Vec<PointSample>,
        rng: &mut impl Rng,
    ) -> NewActivity {
        let start_date = samples
            .first()
            .map(|s| s.timestamp)
            .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
        let elapsed_time_s = samples
            .last()
            .map(|s| (s.timestamp - start_date).as_seconds_f64())
            .unwrap_or(0.0);
        let distance = samples.last().map(|s| s.cumulative_distance).unwrap_or(0.0);

        NewActivity {
            activity_id,
            name: self.generate_name(rng),
            start_date,
            elapsed_time_s,
            average_heartrate: mean(samples.iter().filter_map(|s| s.heart_rate)),
            average_speed: (elapsed_time_s > 0.0).then(|| distance / elapsed_time_s),
            samples,
        }
    }

    fn generate_name(&self, rng: &mut impl Rng) -> String {
        let prefix = self
            .name_config
            .prefixes
            .choose(rng)
            .map(String::as_str)
            .unwrap_or("Activity");
        match self.name_config.location_suffixes.choose(rng) {
            Some(suffix) if rng.gen_bool(0.5) => format!("{prefix} {suffix}"),
            _ => prefix.to_string(),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
