use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};
use time::OffsetDateTime;

use crate::{
    errors::AppError,
    models::{
        ActivitySummary, BoundingBox, CacheEntry, CacheKey, GeoPoint, ListKey, Match,
        PointSample, ResolvedRange, Route, Segment, SegmentGeometry, SegmentMetrics,
    },
    store::{CacheStore, RouteStore, ensure_owner},
};

/// Postgres binds at most 65535 parameters per statement.
const SAMPLE_INSERT_CHUNK: usize = 4000;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SampleRow {
    activity_id: i64,
    point_index: i32,
    recorded_at: OffsetDateTime,
    lat: Option<f64>,
    lon: Option<f64>,
    altitude: Option<f64>,
    heart_rate: Option<f64>,
    speed: Option<f64>,
    cadence: Option<f64>,
    grade: Option<f64>,
    moving: Option<bool>,
    cumulative_distance: f64,
}

impl From<SampleRow> for PointSample {
    fn from(row: SampleRow) -> Self {
        let location = match (row.lat, row.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };
        PointSample {
            index: row.point_index.max(0) as usize,
            timestamp: row.recorded_at,
            location,
            altitude: row.altitude,
            heart_rate: row.heart_rate,
            speed: row.speed,
            cadence: row.cadence,
            grade: row.grade,
            moving: row.moving,
            cumulative_distance: row.cumulative_distance,
        }
    }
}

#[derive(Debug, FromRow)]
struct SegmentRow {
    id: i64,
    athlete_id: i64,
    name: String,
    description: Option<String>,
    vertices: Json<Vec<GeoPoint>>,
    length_m: f64,
    elevation_gain_m: Option<f64>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Segment {
            id: row.id,
            athlete_id: row.athlete_id,
            name: row.name,
            description: row.description,
            vertices: row.vertices.0,
            length_m: row.length_m,
            elevation_gain_m: row.elevation_gain_m,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    id: i64,
    athlete_id: i64,
    name: String,
    start_date: OffsetDateTime,
    elapsed_time_s: f64,
    average_heartrate: Option<f64>,
    average_speed: Option<f64>,
}

impl From<SummaryRow> for ActivitySummary {
    fn from(row: SummaryRow) -> Self {
        ActivitySummary {
            activity_id: row.id,
            athlete_id: row.athlete_id,
            name: row.name,
            start_date: row.start_date,
            elapsed_time_s: row.elapsed_time_s,
            average_heartrate: row.average_heartrate,
            average_speed: row.average_speed,
        }
    }
}

#[derive(Debug, FromRow)]
struct CacheRow {
    segment_id: i64,
    activity_id: i64,
    tolerance_meters: f64,
    min_distance_m: f64,
    overlap_length_m: f64,
    overlap_percentage: f64,
    start_index: Option<i32>,
    end_index: Option<i32>,
    avg_hr: Option<f64>,
    avg_speed: Option<f64>,
    distance_m: Option<f64>,
    elevation_gain_m: Option<f64>,
    cached_at: OffsetDateTime,
}

impl From<CacheRow> for CacheEntry {
    fn from(row: CacheRow) -> Self {
        let range = match (row.start_index, row.end_index) {
            (Some(start), Some(end)) if 0 <= start && start <= end => Some(ResolvedRange {
                start_index: start as usize,
                end_index: end as usize,
            }),
            _ => None,
        };
        let metrics = match (row.distance_m, row.elevation_gain_m) {
            (Some(distance_m), Some(elevation_gain_m)) => Some(SegmentMetrics {
                avg_hr: row.avg_hr,
                avg_speed: row.avg_speed,
                distance_m,
                elevation_gain_m,
            }),
            _ => None,
        };
        CacheEntry {
            segment_id: row.segment_id,
            tolerance_meters: row.tolerance_meters,
            matched: Match {
                activity_id: row.activity_id,
                min_distance_m: row.min_distance_m,
                overlap_length_m: row.overlap_length_m,
                overlap_percentage: row.overlap_percentage,
            },
            range,
            metrics,
            cached_at: row.cached_at,
        }
    }
}

const SAMPLE_COLUMNS: &str = "activity_id, point_index, recorded_at, lat, lon, altitude, \
     heart_rate, speed, cadence, grade, moving, cumulative_distance";

const SEGMENT_COLUMNS: &str = "id, athlete_id, name, description, vertices, length_m, \
     elevation_gain_m, created_at, updated_at";

const CACHE_COLUMNS: &str = "segment_id, activity_id, tolerance_meters, min_distance_m, \
     overlap_length_m, overlap_percentage, start_index, end_index, avg_hr, avg_speed, \
     distance_m, elevation_gain_m, cached_at";

fn route_from_rows(
    activity_id: i64,
    athlete_id: i64,
    rows: Vec<SampleRow>,
) -> Result<Route, AppError> {
    Route::new(
        activity_id,
        athlete_id,
        rows.into_iter().map(PointSample::from).collect(),
    )
}

#[async_trait]
impl RouteStore for Database {
    async fn get_route(&self, athlete_id: i64, activity_id: i64) -> Result<Route, AppError> {
        let owner: Option<i64> = sqlx::query_scalar("SELECT athlete_id FROM activities WHERE id = $1")
            .bind(activity_id)
            .fetch_optional(&self.pool)
            .await?;
        let owner = owner.ok_or(AppError::NotFound)?;
        ensure_owner(owner, athlete_id)?;

        let rows: Vec<SampleRow> = sqlx::query_as(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM point_samples WHERE activity_id = $1 ORDER BY point_index"
        ))
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await?;

        route_from_rows(activity_id, owner, rows)
    }

    async fn get_routes(&self, athlete_id: i64, activity_ids: &[i64]) -> Result<Vec<Route>, AppError> {
        let owned: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM activities WHERE athlete_id = $1 AND id = ANY($2) ORDER BY id",
        )
        .bind(athlete_id)
        .bind(activity_ids)
        .fetch_all(&self.pool)
        .await?;

        let rows: Vec<SampleRow> = sqlx::query_as(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM point_samples
             WHERE activity_id = ANY($1)
             ORDER BY activity_id, point_index"
        ))
        .bind(&owned)
        .fetch_all(&self.pool)
        .await?;

        let mut routes = Vec::with_capacity(owned.len());
        let mut rows = rows.into_iter().peekable();
        for activity_id in owned {
            let mut samples = Vec::new();
            while let Some(row) = rows.next_if(|r| r.activity_id == activity_id) {
                samples.push(row);
            }
            routes.push(route_from_rows(activity_id, athlete_id, samples)?);
        }
        Ok(routes)
    }

    async fn get_segment(&self, segment_id: i64) -> Result<Segment, AppError> {
        let row: Option<SegmentRow> = sqlx::query_as(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM favorite_segments WHERE id = $1"
        ))
        .bind(segment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Segment::from).ok_or(AppError::NotFound)
    }

    async fn list_segments(&self, athlete_id: i64) -> Result<Vec<Segment>, AppError> {
        let rows: Vec<SegmentRow> = sqlx::query_as(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM favorite_segments WHERE athlete_id = $1 ORDER BY name, id"
        ))
        .bind(athlete_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Segment::from).collect())
    }

    async fn list_candidate_routes(
        &self,
        athlete_id: i64,
        bbox: BoundingBox,
    ) -> Result<Vec<i64>, AppError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT rb.activity_id
            FROM route_bounds rb
            JOIN activities a ON a.id = rb.activity_id
            WHERE a.athlete_id = $1
              AND rb.min_lat <= $4 AND rb.max_lat >= $2
              AND rb.min_lon <= $5 AND rb.max_lon >= $3
            ORDER BY rb.activity_id
            "#,
        )
        .bind(athlete_id)
        .bind(bbox.min_lat)
        .bind(bbox.min_lon)
        .bind(bbox.max_lat)
        .bind(bbox.max_lon)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn get_activity_summary(&self, activity_id: i64) -> Result<ActivitySummary, AppError> {
        let row: Option<SummaryRow> = sqlx::query_as(
            r#"
            SELECT id, athlete_id, name, start_date, elapsed_time_s,
                   average_heartrate, average_speed
            FROM activities
            WHERE id = $1
            "#,
        )
        .bind(activity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ActivitySummary::from).ok_or(AppError::NotFound)
    }

    async fn get_activity_summaries(
        &self,
        athlete_id: i64,
        activity_ids: &[i64],
    ) -> Result<Vec<ActivitySummary>, AppError> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT id, athlete_id, name, start_date, elapsed_time_s,
                   average_heartrate, average_speed
            FROM activities
            WHERE athlete_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(athlete_id)
        .bind(activity_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivitySummary::from).collect())
    }

    async fn insert_segment(
        &self,
        athlete_id: i64,
        name: &str,
        description: Option<&str>,
        geometry: &SegmentGeometry,
    ) -> Result<Segment, AppError> {
        let row: SegmentRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO favorite_segments (athlete_id, name, description, vertices,
                                           length_m, elevation_gain_m)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SEGMENT_COLUMNS}
            "#
        ))
        .bind(athlete_id)
        .bind(name)
        .bind(description)
        .bind(Json(&geometry.vertices))
        .bind(geometry.length_m)
        .bind(geometry.elevation_gain_m)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_segment_geometry(
        &self,
        segment_id: i64,
        name: &str,
        description: Option<&str>,
        geometry: &SegmentGeometry,
    ) -> Result<Segment, AppError> {
        let row: Option<SegmentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE favorite_segments
            SET name = $2, description = $3, vertices = $4,
                length_m = $5, elevation_gain_m = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {SEGMENT_COLUMNS}
            "#
        ))
        .bind(segment_id)
        .bind(name)
        .bind(description)
        .bind(Json(&geometry.vertices))
        .bind(geometry.length_m)
        .bind(geometry.elevation_gain_m)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Segment::from).ok_or(AppError::NotFound)
    }

    async fn delete_segment(&self, segment_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM favorite_segments WHERE id = $1")
            .bind(segment_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn insert_activity(
        &self,
        summary: &ActivitySummary,
        route: &Route,
    ) -> Result<(), AppError> {
        if route.len() > i32::MAX as usize {
            return Err(AppError::InvalidInput(format!(
                "Activity {} has too many samples",
                summary.activity_id
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO activities (id, athlete_id, name, start_date, elapsed_time_s,
                                    average_heartrate, average_speed)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET athlete_id = EXCLUDED.athlete_id,
                name = EXCLUDED.name,
                start_date = EXCLUDED.start_date,
                elapsed_time_s = EXCLUDED.elapsed_time_s,
                average_heartrate = EXCLUDED.average_heartrate,
                average_speed = EXCLUDED.average_speed
            "#,
        )
        .bind(summary.activity_id)
        .bind(summary.athlete_id)
        .bind(&summary.name)
        .bind(summary.start_date)
        .bind(summary.elapsed_time_s)
        .bind(summary.average_heartrate)
        .bind(summary.average_speed)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM point_samples WHERE activity_id = $1")
            .bind(summary.activity_id)
            .execute(&mut *tx)
            .await?;

        for chunk in route.samples().chunks(SAMPLE_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO point_samples ({SAMPLE_COLUMNS}) "));
            builder.push_values(chunk, |mut b, sample| {
                b.push_bind(summary.activity_id)
                    .push_bind(sample.index as i32)
                    .push_bind(sample.timestamp)
                    .push_bind(sample.location.map(|l| l.lat))
                    .push_bind(sample.location.map(|l| l.lon))
                    .push_bind(sample.altitude)
                    .push_bind(sample.heart_rate)
                    .push_bind(sample.speed)
                    .push_bind(sample.cadence)
                    .push_bind(sample.grade)
                    .push_bind(sample.moving)
                    .push_bind(sample.cumulative_distance);
            });
            builder.build().execute(&mut *tx).await?;
        }

        match BoundingBox::from_points(&route.polyline()) {
            Some(bounds) => {
                sqlx::query(
                    r#"
                    INSERT INTO route_bounds (activity_id, min_lat, min_lon, max_lat, max_lon)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (activity_id) DO UPDATE
                    SET min_lat = EXCLUDED.min_lat, min_lon = EXCLUDED.min_lon,
                        max_lat = EXCLUDED.max_lat, max_lon = EXCLUDED.max_lon
                    "#,
                )
                .bind(summary.activity_id)
                .bind(bounds.min_lat)
                .bind(bounds.min_lon)
                .bind(bounds.max_lat)
                .bind(bounds.max_lon)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM route_bounds WHERE activity_id = $1")
                    .bind(summary.activity_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_activity(&self, activity_id: i64) -> Result<(), AppError> {
        // Samples, bounds and cache rows go with it.
        let result = sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(activity_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for Database {
    async fn get_entry(&self, key: CacheKey) -> Result<Option<CacheEntry>, AppError> {
        let row: Option<CacheRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CACHE_COLUMNS}
            FROM segment_activity_matches
            WHERE segment_id = $1 AND activity_id = $2 AND tolerance_meters = $3
            "#
        ))
        .bind(key.segment_id)
        .bind(key.activity_id)
        .bind(key.tolerance_m())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CacheEntry::from))
    }

    async fn list_entries(&self, key: ListKey) -> Result<Vec<CacheEntry>, AppError> {
        let rows: Vec<CacheRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CACHE_COLUMNS}
            FROM segment_activity_matches
            WHERE segment_id = $1 AND tolerance_meters = $2
            ORDER BY activity_id
            "#
        ))
        .bind(key.segment_id)
        .bind(key.tolerance_m())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CacheEntry::from).collect())
    }

    async fn list_refreshed_at(&self, key: ListKey) -> Result<Option<OffsetDateTime>, AppError> {
        let refreshed_at = sqlx::query_scalar(
            r#"
            SELECT refreshed_at FROM segment_match_lists
            WHERE segment_id = $1 AND tolerance_meters = $2
            "#,
        )
        .bind(key.segment_id)
        .bind(key.tolerance_m())
        .fetch_optional(&self.pool)
        .await?;

        Ok(refreshed_at)
    }

    async fn replace_matches(
        &self,
        key: ListKey,
        matches: &[Match],
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        let activity_ids: Vec<i64> = matches.iter().map(|m| m.activity_id).collect();
        let min_distances: Vec<f64> = matches.iter().map(|m| m.min_distance_m).collect();
        let overlap_lengths: Vec<f64> = matches.iter().map(|m| m.overlap_length_m).collect();
        let overlap_percentages: Vec<f64> = matches.iter().map(|m| m.overlap_percentage).collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM segment_activity_matches
            WHERE segment_id = $1 AND tolerance_meters = $2
              AND NOT (activity_id = ANY($3))
            "#,
        )
        .bind(key.segment_id)
        .bind(key.tolerance_m())
        .bind(&activity_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO segment_activity_matches
                (segment_id, activity_id, tolerance_meters, min_distance_m,
                 overlap_length_m, overlap_percentage, cached_at)
            SELECT $1, m.activity_id, $2, m.min_distance_m,
                   m.overlap_length_m, m.overlap_percentage, $7
            FROM UNNEST($3::BIGINT[], $4::FLOAT8[], $5::FLOAT8[], $6::FLOAT8[])
                AS m(activity_id, min_distance_m, overlap_length_m, overlap_percentage)
            ON CONFLICT (segment_id, activity_id, tolerance_meters) DO UPDATE
            SET min_distance_m = EXCLUDED.min_distance_m,
                overlap_length_m = EXCLUDED.overlap_length_m,
                overlap_percentage = EXCLUDED.overlap_percentage,
                cached_at = EXCLUDED.cached_at
            "#,
        )
        .bind(key.segment_id)
        .bind(key.tolerance_m())
        .bind(&activity_ids)
        .bind(&min_distances)
        .bind(&overlap_lengths)
        .bind(&overlap_percentages)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO segment_match_lists (segment_id, tolerance_meters, refreshed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (segment_id, tolerance_meters) DO UPDATE
            SET refreshed_at = EXCLUDED.refreshed_at
            "#,
        )
        .bind(key.segment_id)
        .bind(key.tolerance_m())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_match(
        &self,
        key: CacheKey,
        matched: &Match,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO segment_activity_matches
                (segment_id, activity_id, tolerance_meters, min_distance_m,
                 overlap_length_m, overlap_percentage, cached_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (segment_id, activity_id, tolerance_meters) DO UPDATE
            SET min_distance_m = EXCLUDED.min_distance_m,
                overlap_length_m = EXCLUDED.overlap_length_m,
                overlap_percentage = EXCLUDED.overlap_percentage,
                cached_at = EXCLUDED.cached_at
            "#,
        )
        .bind(key.segment_id)
        .bind(key.activity_id)
        .bind(key.tolerance_m())
        .bind(matched.min_distance_m)
        .bind(matched.overlap_length_m)
        .bind(matched.overlap_percentage)
        .bind(now)
        .execute(&self.pool)
        .await?;

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
        let (start_index, end_index) = match (
            i32::try_from(range.start_index),
            i32::try_from(range.end_index),
        ) {
            (Ok(start), Ok(end)) => (start, end),
            _ => return Err(AppError::Internal),
        };

        sqlx::query(
            r#"
            INSERT INTO segment_activity_matches
                (segment_id, activity_id, tolerance_meters, min_distance_m,
                 overlap_length_m, overlap_percentage, start_index, end_index,
                 avg_hr, avg_speed, distance_m, elevation_gain_m, cached_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (segment_id, activity_id, tolerance_meters) DO UPDATE
            SET min_distance_m = EXCLUDED.min_distance_m,
                overlap_length_m = EXCLUDED.overlap_length_m,
                overlap_percentage = EXCLUDED.overlap_percentage,
                start_index = EXCLUDED.start_index,
                end_index = EXCLUDED.end_index,
                avg_hr = EXCLUDED.avg_hr,
                avg_speed = EXCLUDED.avg_speed,
                distance_m = EXCLUDED.distance_m,
                elevation_gain_m = EXCLUDED.elevation_gain_m,
                cached_at = EXCLUDED.cached_at
            "#,
        )
        .bind(key.segment_id)
        .bind(key.activity_id)
        .bind(key.tolerance_m())
        .bind(matched.min_distance_m)
        .bind(matched.overlap_length_m)
        .bind(matched.overlap_percentage)
        .bind(start_index)
        .bind(end_index)
        .bind(metrics.avg_hr)
        .bind(metrics.avg_speed)
        .bind(metrics.distance_m)
        .bind(metrics.elevation_gain_m)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn invalidate_segment(&self, segment_id: i64) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM segment_activity_matches WHERE segment_id = $1")
            .bind(segment_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM segment_match_lists WHERE segment_id = $1")
            .bind(segment_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed)
    }

    async fn invalidate_activity(&self, activity_id: i64) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM segment_match_lists l
            USING segment_activity_matches m
            WHERE m.activity_id = $1
              AND l.segment_id = m.segment_id
              AND l.tolerance_meters = m.tolerance_meters
            "#,
        )
        .bind(activity_id)
        .execute(&mut *tx)
        .await?;

        let removed = sqlx::query("DELETE FROM segment_activity_matches WHERE activity_id = $1")
            .bind(activity_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed)
    }
}
