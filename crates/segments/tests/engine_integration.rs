//! End-to-end engine tests against the in-memory store.
//!
//! Run with: `cargo nextest run -p segments engine`

mod common;

use common::*;
use segments::{
    engine::SegmentDraft,
    errors::AppError,
    models::{GeoPoint, Segment},
    ranking::SortKey,
    series::SeriesKind,
};
use time::Duration;

/// Straight legs between `corners` (north, east in meters), sampled every `step_m`.
fn polyline(corners: &[(f64, f64)], step_m: f64) -> Vec<GeoPoint> {
    let mut points = vec![at(corners[0].0, corners[0].1)];
    for leg in corners.windows(2) {
        let ((n0, e0), (n1, e1)) = (leg[0], leg[1]);
        let length = ((n1 - n0).powi(2) + (e1 - e0).powi(2)).sqrt();
        let steps = (length / step_m).ceil().max(1.0) as usize;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            points.push(at(n0 + (n1 - n0) * t, e0 + (e1 - e0) * t));
        }
    }
    points
}

fn retrace() -> Vec<GeoPoint> {
    northward(-100.0, 1100.0, 0.0, 10.0)
}

async fn create_segment(h: &Harness) -> Segment {
    h.engine
        .create_segment(ATHLETE, kilometer_segment("River path"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_retrace_covers_whole_segment() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| Some(150.0)), Some(150.0)))
        .await
        .unwrap();

    let items = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].activity_id, 1);
    assert!(items[0].min_distance_m < 0.5, "{}", items[0].min_distance_m);
    assert!((items[0].overlap_percentage - 100.0).abs() < 0.5);
    assert!((items[0].overlap_length_m - segment.length_m).abs() < 5.0);
    assert!(!items[0].has_segment_metrics());
}

#[tokio::test]
async fn test_two_of_three_vertices_is_not_a_match() {
    let h = harness();
    let segment = create_segment(&h).await;
    // 10 m from the first two vertices, 50 m from the last.
    let drifting = polyline(&[(0.0, 10.0), (500.0, 10.0), (1000.0, 50.0)], 10.0);
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| None), None))
        .await
        .unwrap();
    h.engine
        .ingest_activity(ATHLETE, activity(2, samples(&drifting, |_| None), None))
        .await
        .unwrap();

    let items = h
        .engine
        .list_matches(ATHLETE, segment.id, Some(TOLERANCE_M), SortKey::Distance, false)
        .await
        .unwrap();

    let ids: Vec<i64> = items.iter().map(|m| m.activity_id).collect();
    assert_eq!(ids, vec![1]);
    assert!(items.iter().all(|m| m.min_distance_m <= TOLERANCE_M));
}

#[tokio::test]
async fn test_metrics_cached_after_first_request() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| Some(150.0)), Some(150.0)))
        .await
        .unwrap();

    let first = h
        .engine
        .segment_activity_metrics(ATHLETE, segment.id, 1, None)
        .await
        .unwrap();
    assert_eq!(h.routes.route_loads(), 1);

    let second = h
        .engine
        .segment_activity_metrics(ATHLETE, segment.id, 1, None)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(h.routes.route_loads(), 1);
    assert_eq!(h.store.entry_count().await, 1);

    assert_eq!(first.avg_hr, Some(150.0));
    assert_eq!(first.avg_speed, Some(3.0));
    assert!((first.distance_m - 1020.0).abs() < 15.0, "{}", first.distance_m);

    let range = h
        .engine
        .resolve_indices(ATHLETE, segment.id, 1, None)
        .await
        .unwrap();
    assert!(range.start_index <= range.end_index);
    assert_eq!(h.routes.route_loads(), 1);
}

#[tokio::test]
async fn test_metrics_before_listing_fill_one_row() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| Some(150.0)), Some(150.0)))
        .await
        .unwrap();

    h.engine
        .segment_activity_metrics(ATHLETE, segment.id, 1, None)
        .await
        .unwrap();
    assert_eq!(h.store.entry_count().await, 1);
    assert_eq!(h.routes.matcher_passes(), 0);

    // The metrics path never marks the list as fresh.
    let items = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    assert_eq!(h.routes.matcher_passes(), 1);
    assert_eq!(h.store.entry_count().await, 1);
    assert_eq!(items[0].segment_avg_hr, Some(150.0));
}

#[tokio::test]
async fn test_heart_rate_dropout_is_skipped() {
    let h = harness();
    let segment = create_segment(&h).await;
    let points = retrace();
    h.engine
        .ingest_activity(
            ATHLETE,
            activity(
                1,
                samples(&points, |i| (!(40..45).contains(&i)).then_some(150.0)),
                Some(150.0),
            ),
        )
        .await
        .unwrap();
    h.engine
        .ingest_activity(ATHLETE, activity(2, samples(&points, |_| Some(150.0)), Some(150.0)))
        .await
        .unwrap();

    let dropout = h
        .engine
        .segment_activity_metrics(ATHLETE, segment.id, 1, None)
        .await
        .unwrap();
    let clean = h
        .engine
        .segment_activity_metrics(ATHLETE, segment.id, 2, None)
        .await
        .unwrap();

    assert_eq!(dropout.avg_hr, Some(150.0));
    assert_eq!(dropout.distance_m, clean.distance_m);
}

#[tokio::test]
async fn test_avg_hr_ranking_uses_one_source_per_item() {
    let h = harness();
    let segment = create_segment(&h).await;
    // A: 150 on the segment, 130 over the whole activity.
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| Some(150.0)), Some(130.0)))
        .await
        .unwrap();
    // B: nothing cached for the segment, 140 over the whole activity.
    h.engine
        .ingest_activity(ATHLETE, activity(2, samples(&retrace(), |_| Some(100.0)), Some(140.0)))
        .await
        .unwrap();

    h.engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    h.engine
        .segment_activity_metrics(ATHLETE, segment.id, 1, None)
        .await
        .unwrap();

    let ranked = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::AvgHr, false)
        .await
        .unwrap();

    assert_eq!(h.routes.matcher_passes(), 1);
    let ids: Vec<i64> = ranked.iter().map(|m| m.activity_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(ranked[0].segment_avg_hr, Some(150.0));
    assert_eq!(ranked[1].segment_avg_hr, None);
    assert_eq!(ranked[1].average_heartrate, Some(140.0));
}

#[tokio::test]
async fn test_list_is_fresh_for_the_ttl() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| None), None))
        .await
        .unwrap();

    let list = |force| h.engine.list_matches(ATHLETE, segment.id, None, SortKey::Distance, force);

    list(false).await.unwrap();
    list(false).await.unwrap();
    assert_eq!(h.routes.matcher_passes(), 1);

    h.clock.advance(Duration::minutes(59));
    list(false).await.unwrap();
    assert_eq!(h.routes.matcher_passes(), 1);

    h.clock.advance(Duration::minutes(2));
    list(false).await.unwrap();
    assert_eq!(h.routes.matcher_passes(), 2);

    list(true).await.unwrap();
    assert_eq!(h.routes.matcher_passes(), 3);
}

#[tokio::test]
async fn test_empty_list_is_cached() {
    let h = harness();
    let segment = create_segment(&h).await;

    for _ in 0..2 {
        let items = h
            .engine
            .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
            .await
            .unwrap();
        assert!(items.is_empty());
    }
    assert_eq!(h.routes.matcher_passes(), 1);
}

#[tokio::test]
async fn test_invalidate_segment_forces_recompute() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| Some(150.0)), None))
        .await
        .unwrap();

    h.engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    h.engine
        .segment_activity_metrics(ATHLETE, segment.id, 1, None)
        .await
        .unwrap();
    // A second tolerance gets its own rows.
    h.engine
        .list_matches(ATHLETE, segment.id, Some(25.0), SortKey::Distance, false)
        .await
        .unwrap();
    assert_eq!(h.store.entry_count().await, 2);

    let removed = h.engine.invalidate_segment(ATHLETE, segment.id).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(h.store.entry_count().await, 0);

    let items = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    assert_eq!(h.routes.matcher_passes(), 3);
    assert!(!items[0].has_segment_metrics());
}

#[tokio::test]
async fn test_segment_edit_drops_cached_matches() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| None), None))
        .await
        .unwrap();
    let before = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    assert_eq!(before.len(), 1);

    let moved = SegmentDraft {
        vertices: vec![at(0.0, 2000.0), at(1000.0, 2000.0)],
        altitudes: None,
        ..kilometer_segment("River path")
    };
    h.engine
        .update_segment(ATHLETE, segment.id, moved)
        .await
        .unwrap();

    let after = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    assert!(after.is_empty());
    assert_eq!(h.routes.matcher_passes(), 2);
}

#[tokio::test]
async fn test_reupload_replaces_cached_match() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| None), None))
        .await
        .unwrap();
    let items = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);

    let elsewhere = northward(-100.0, 1100.0, 5000.0, 10.0);
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&elsewhere, |_| None), None))
        .await
        .unwrap();
    assert_eq!(h.store.entry_count().await, 0);

    let items = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_deleted_activity_leaves_the_list() {
    let h = harness();
    let segment = create_segment(&h).await;
    for id in [1, 2] {
        h.engine
            .ingest_activity(ATHLETE, activity(id, samples(&retrace(), |_| None), None))
            .await
            .unwrap();
    }
    h.engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();

    h.engine.delete_activity(ATHLETE, 2).await.unwrap();

    let items = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    let ids: Vec<i64> = items.iter().map(|m| m.activity_id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_cross_athlete_requests_rejected_without_caching() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| None), None))
        .await
        .unwrap();
    h.engine
        .ingest_activity(OTHER_ATHLETE, activity(9, samples(&retrace(), |_| None), None))
        .await
        .unwrap();

    let err = h
        .engine
        .segment_activity_metrics(OTHER_ATHLETE, segment.id, 9, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = h
        .engine
        .segment_activity_metrics(ATHLETE, segment.id, 9, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = h
        .engine
        .list_matches(OTHER_ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    assert_eq!(h.store.entry_count().await, 0);

    // Only the owner's routes are candidates.
    let items = h
        .engine
        .list_matches(ATHLETE, segment.id, None, SortKey::Distance, false)
        .await
        .unwrap();
    let ids: Vec<i64> = items.iter().map(|m| m.activity_id).collect();
    assert_eq!(ids, vec![1]);

    let err = h
        .engine
        .ingest_activity(OTHER_ATHLETE, activity(1, samples(&retrace(), |_| None), None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

#[tokio::test]
async fn test_concurrent_requests_compute_once() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| Some(150.0)), None))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.engine.segment_activity_metrics(ATHLETE, segment.id, 1, None),
        h.engine.segment_activity_metrics(ATHLETE, segment.id, 1, None),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(h.routes.route_loads(), 1);
    assert_eq!(h.store.entry_count().await, 1);
}

#[tokio::test]
async fn test_route_off_the_segment_has_no_indices() {
    let h = harness();
    let segment = create_segment(&h).await;
    let elsewhere = northward(-100.0, 1100.0, 5000.0, 10.0);
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&elsewhere, |_| None), None))
        .await
        .unwrap();

    let err = h
        .engine
        .resolve_indices(ATHLETE, segment.id, 1, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    assert_eq!(h.store.entry_count().await, 0);
}

#[tokio::test]
async fn test_series_over_segment() {
    let h = harness();
    let segment = create_segment(&h).await;
    h.engine
        .ingest_activity(ATHLETE, activity(1, samples(&retrace(), |_| Some(150.0)), None))
        .await
        .unwrap();

    let range = h
        .engine
        .resolve_indices(ATHLETE, segment.id, 1, None)
        .await
        .unwrap();
    let series = h
        .engine
        .segment_series(
            ATHLETE,
            segment.id,
            1,
            None,
            &[SeriesKind::Heartrate, SeriesKind::Speed],
            None,
        )
        .await
        .unwrap();

    assert_eq!(series.len(), 2);
    assert_eq!(series[0].metric, SeriesKind::Heartrate);
    assert_eq!(
        series[0].points.len(),
        range.end_index - range.start_index + 1
    );
    assert!(series[0].points.iter().all(|p| p.value == 150.0));
}

#[tokio::test]
async fn test_segment_lifecycle() {
    let h = harness();
    let segment = create_segment(&h).await;
    assert_eq!(segment.elevation_gain_m, Some(25.0));

    let summary = h.engine.segment_summary(ATHLETE, segment.id).await.unwrap();
    assert_eq!(summary.segment_id, segment.id);
    assert!((summary.distance_m - 1000.0).abs() < 1.0);

    let err = h
        .engine
        .create_segment(
            ATHLETE,
            SegmentDraft {
                vertices: vec![at(0.0, 0.0)],
                altitudes: None,
                ..kilometer_segment("Dot")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = h.engine.delete_segment(OTHER_ATHLETE, segment.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    h.engine.delete_segment(ATHLETE, segment.id).await.unwrap();
    let err = h.engine.get_segment(ATHLETE, segment.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    assert!(h.engine.list_segments(ATHLETE).await.unwrap().is_empty());
}
