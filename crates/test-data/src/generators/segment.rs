//! Segment extraction from generated routes.

use segments::{engine::SegmentDraft, geo_primitives::haversine, models::GeoPoint};

/// Configuration for segment extraction.
#[derive(Debug, Clone)]
pub struct SegmentExtractConfig {
    /// Minimum segment length in meters.
    pub min_length_m: f64,
    /// Maximum segment length in meters.
    pub max_length_m: f64,
    /// Spacing between kept vertices in meters.
    pub vertex_spacing_m: f64,
}

impl Default for SegmentExtractConfig {
    fn default() -> Self {
        Self {
            min_length_m: 200.0,
            max_length_m: 5000.0,
            vertex_spacing_m: 50.0,
        }
    }
}

/// Cuts favorite segments out of clean route paths.
#[derive(Debug, Clone, Default)]
pub struct SegmentGenerator {
    config: SegmentExtractConfig,
}

impl SegmentGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SegmentExtractConfig) -> Self {
        Self { config }
    }

    /// Extracts the part of `path` between two fractions of its point count.
    ///
    /// `altitudes`, when given, must align with `path`. Returns `None` when
    /// the piece falls outside the configured length range.
    pub fn extract_from_route(
        &self,
        path: &[GeoPoint],
        altitudes: Option<&[f64]>,
        start_fraction: f64,
        end_fraction: f64,
        name: impl Into<String>,
    ) -> Option<SegmentDraft> {
        if path.len() < 2 || start_fraction >= end_fraction {
            return None;
        }

        let start_idx = (start_fraction.clamp(0.0, 1.0) * path.len() as f64) as usize;
        let end_idx = ((end_fraction.clamp(0.0, 1.0) * path.len() as f64) as usize).min(path.len());
        if end_idx <= start_idx + 1 {
            return None;
        }

        let kept = self.thin(&path[start_idx..end_idx]);
        let vertices: Vec<GeoPoint> = kept.iter().map(|&i| path[start_idx + i]).collect();
        let length: f64 = vertices.windows(2).map(|w| haversine(w[0], w[1])).sum();
        if length < self.config.min_length_m || length > self.config.max_length_m {
            return None;
        }

        let altitudes = altitudes
            .filter(|alts| alts.len() == path.len())
            .map(|alts| kept.iter().map(|&i| Some(alts[start_idx + i])).collect());

        Some(SegmentDraft {
            name: name.into(),
            description: Some(format!("{:.0} m cut from a generated route", length)),
            vertices,
            altitudes,
        })
    }

    /// Indices of the points kept at roughly `vertex_spacing_m` apart. The
    /// first and last points are always kept.
    fn thin(&self, points: &[GeoPoint]) -> Vec<usize> {
        let mut kept = vec![0];
        let mut since_last = 0.0;
        for i in 1..points.len() {
            since_last += haversine(points[i - 1], points[i]);
            if since_last >= self.config.vertex_spacing_m || i == points.len() - 1 {
                kept.push(i);
                since_last = 0.0;
            }
        }
        kept
    }
}
