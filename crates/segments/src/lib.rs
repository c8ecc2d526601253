pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod engine;
pub mod errors;
pub mod geo_primitives;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod openapi;
pub mod ranking;
pub mod request_id;
pub mod resolver;
pub mod scoring;
pub mod segment_matching;
pub mod series;
pub mod store;
pub mod types;

use axum::{
    Extension, Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    engine::SegmentEngine,
    handlers::{
        create_segment, delete_activity, delete_segment, get_segment,
        get_segment_activity_metrics, get_segment_indices, get_segment_series,
        get_segment_summary, health_check, ingest_activity, invalidate_activity,
        invalidate_segment, list_segment_activities, list_segments, update_segment,
    },
    openapi::ApiDoc,
    request_id::request_id_middleware,
};

pub fn create_router(engine: SegmentEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health_check))
        // Segment routes
        .route("/segments", get(list_segments).post(create_segment))
        .route(
            "/segments/{id}",
            get(get_segment).put(update_segment).delete(delete_segment),
        )
        .route("/segments/{id}/metrics", get(get_segment_summary))
        .route("/segments/{id}/activities", get(list_segment_activities))
        .route(
            "/segments/{id}/activity/{activity_id}/indices",
            get(get_segment_indices),
        )
        .route(
            "/segments/{id}/activity/{activity_id}/metrics",
            get(get_segment_activity_metrics),
        )
        .route(
            "/segments/{id}/activity/{activity_id}/series",
            get(get_segment_series),
        )
        // Activity routes
        .route("/activities", post(ingest_activity))
        .route("/activities/{id}", axum::routing::delete(delete_activity))
        // Cache routes
        .route("/cache/segments/{id}/invalidate", post(invalidate_segment))
        .route("/cache/activities/{id}/invalidate", post(invalidate_activity))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(Extension(engine))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
}

pub async fn run_server(engine: SegmentEngine, port: u16) -> anyhow::Result<()> {
    let app = create_router(engine);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!("Server running on http://0.0.0.0:{port}");

    axum::serve(listener, app).await?;

    Ok(())
}
