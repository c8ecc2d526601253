//! In-memory implementation of both store traits.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{
    errors::AppError,
    models::{
        ActivitySummary, BoundingBox, CacheEntry, CacheKey, ListKey, Match, ResolvedRange, Route,
        Segment, SegmentGeometry, SegmentMetrics,
    },
    store::{CacheStore, RouteStore, ensure_owner},
};

#[derive(Debug, Clone)]
struct StoredActivity {
    summary: ActivitySummary,
    route: Route,
    bounds: Option<BoundingBox>,
}

#[derive(Debug, Default)]
struct State {
    segments: HashMap<i64, Segment>,
    last_segment_id: i64,
    activities: HashMap<i64, StoredActivity>,
    entries: HashMap<CacheKey, CacheEntry>,
    lists: HashMap<ListKey, OffsetDateTime>,
}

/// Stores everything behind one `RwLock`. Cloning shares the state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached match rows, for tests and diagnostics.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

fn upsert_entry(
    entries: &mut HashMap<CacheKey, CacheEntry>,
    key: CacheKey,
    matched: Match,
    now: OffsetDateTime,
) -> &mut CacheEntry {
    let entry = entries.entry(key).or_insert_with(|| CacheEntry {
        segment_id: key.segment_id,
        tolerance_meters: key.tolerance_m(),
        matched,
        range: None,
        metrics: None,
        cached_at: now,
    });
    entry.matched = matched;
    entry.cached_at = now;
    entry
}

#[async_trait]
impl RouteStore for InMemoryStore {
    async fn get_route(&self, athlete_id: i64, activity_id: i64) -> Result<Route, AppError> {
        let state = self.state.read().await;
        let stored = state.activities.get(&activity_id).ok_or(AppError::NotFound)?;
        ensure_owner(stored.summary.athlete_id, athlete_id)?;
        Ok(stored.route.clone())
    }

    async fn get_segment(&self, segment_id: i64) -> Result<Segment, AppError> {
        let state = self.state.read().await;
        state
            .segments
            .get(&segment_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn list_segments(&self, athlete_id: i64) -> Result<Vec<Segment>, AppError> {
        let state = self.state.read().await;
        let mut segments: Vec<Segment> = state
            .segments
            .values()
            .filter(|s| s.athlete_id == athlete_id)
            .cloned()
            .collect();
        segments.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(segments)
    }

    async fn list_candidate_routes(
        &self,
        athlete_id: i64,
        bbox: BoundingBox,
    ) -> Result<Vec<i64>, AppError> {
        let state = self.state.read().await;
        let mut ids: Vec<i64> = state
            .activities
            .values()
            .filter(|a| a.summary.athlete_id == athlete_id)
            .filter(|a| a.bounds.is_some_and(|b| b.intersects(&bbox)))
            .map(|a| a.summary.activity_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn get_activity_summary(&self, activity_id: i64) -> Result<ActivitySummary, AppError> {
        let state = self.state.read().await;
        state
            .activities
            .get(&activity_id)
            .map(|a| a.summary.clone())
            .ok_or(AppError::NotFound)
    }

    async fn get_activity_summaries(
        &self,
        athlete_id: i64,
        activity_ids: &[i64],
    ) -> Result<Vec<ActivitySummary>, AppError> {
        let state = self.state.read().await;
        Ok(activity_ids
            .iter()
            .filter_map(|id| state.activities.get(id))
            .filter(|a| a.summary.athlete_id == athlete_id)
            .map(|a| a.summary.clone())
            .collect())
    }

    async fn insert_segment(
        &self,
        athlete_id: i64,
        name: &str,
        description: Option<&str>,
        geometry: &SegmentGeometry,
    ) -> Result<Segment, AppError> {
        let mut state = self.state.write().await;
        state.last_segment_id += 1;
        let now = OffsetDateTime::now_utc();
        let segment = Segment {
            id: state.last_segment_id,
            athlete_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            vertices: geometry.vertices.clone(),
            length_m: geometry.length_m,
            elevation_gain_m: geometry.elevation_gain_m,
            created_at: now,
            updated_at: now,
        };
        state.segments.insert(segment.id, segment.clone());
        Ok(segment)
    }

    async fn update_segment_geometry(
        &self,
        segment_id: i64,
        name: &str,
        description: Option<&str>,
        geometry: &SegmentGeometry,
    ) -> Result<Segment, AppError> {
        let mut state = self.state.write().await;
        let segment = state
            .segments
            .get_mut(&segment_id)
            .ok_or(AppError::NotFound)?;
        segment.name = name.to_string();
        segment.description = description.map(str::to_string);
        segment.vertices = geometry.vertices.clone();
        segment.length_m = geometry.length_m;
        segment.elevation_gain_m = geometry.elevation_gain_m;
        segment.updated_at = OffsetDateTime::now_utc();
        Ok(segment.clone())
    }

    async fn delete_segment(&self, segment_id: i64) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state
            .segments
            .remove(&segment_id)
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }

    async fn insert_activity(
        &self,
        summary: &ActivitySummary,
        route: &Route,
    ) -> Result<(), AppError> {
        let bounds = BoundingBox::from_points(&route.polyline());
        let mut state = self.state.write().await;
        state.activities.insert(
            summary.activity_id,
            StoredActivity {
                summary: summary.clone(),
                route: route.clone(),
                bounds,
            },
        );
        Ok(())
    }

    async fn delete_activity(&self, activity_id: i64) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state
            .activities
            .remove(&activity_id)
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get_entry(&self, key: CacheKey) -> Result<Option<CacheEntry>, AppError> {
        Ok(self.state.read().await.entries.get(&key).cloned())
    }

    async fn list_entries(&self, key: ListKey) -> Result<Vec<CacheEntry>, AppError> {
        let state = self.state.read().await;
        let mut entries: Vec<CacheEntry> = state
            .entries
            .iter()
            .filter(|(k, _)| k.list_key() == key)
            .map(|(_, e)| e.clone())
            .collect();
        entries.sort_by_key(|e| e.matched.activity_id);
        Ok(entries)
    }

    async fn list_refreshed_at(&self, key: ListKey) -> Result<Option<OffsetDateTime>, AppError> {
        Ok(self.state.read().await.lists.get(&key).copied())
    }

    async fn replace_matches(
        &self,
        key: ListKey,
        matches: &[Match],
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.entries.retain(|k, _| {
            k.list_key() != key || matches.iter().any(|m| m.activity_id == k.activity_id)
        });
        for matched in matches {
            let entry_key = CacheKey::new(key.segment_id, matched.activity_id, key.tolerance_m());
            upsert_entry(&mut state.entries, entry_key, *matched, now);
        }
        state.lists.insert(key, now);
        Ok(())
    }

    async fn upsert_match(
        &self,
        key: CacheKey,
        matched: &Match,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        upsert_entry(&mut state.entries, key, *matched, now);
        Ok(())
    }

    async fn store_resolution(
        &self,
        key: CacheKey,
        matched: &Match,
        range: ResolvedRange,
        metrics: &SegmentMetrics,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let entry = upsert_entry(&mut state.entries, key, *matched, now);
        entry.range = Some(range);
        entry.metrics = Some(*metrics);
        Ok(())
    }

    async fn invalidate_segment(&self, segment_id: i64) -> Result<u64, AppError> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|k, _| k.segment_id != segment_id);
        state.lists.retain(|k, _| k.segment_id != segment_id);
        Ok((before - state.entries.len()) as u64)
    }

    async fn invalidate_activity(&self, activity_id: i64) -> Result<u64, AppError> {
        let mut state = self.state.write().await;
        let stale: Vec<ListKey> = state
            .entries
            .keys()
            .filter(|k| k.activity_id == activity_id)
            .map(CacheKey::list_key)
            .collect();
        let before = state.entries.len();
        state.entries.retain(|k, _| k.activity_id != activity_id);
        for key in &stale {
            state.lists.remove(key);
        }
        Ok((before - state.entries.len()) as u64)
    }
}
