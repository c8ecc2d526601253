use segments::{config::Config, database::Database, engine::SegmentEngine, run_server};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Config::from_env();

    tracing::info!("Connecting to database at {}", config.database_url);

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(
        default_tolerance_m = config.engine.default_tolerance_m,
        match_list_ttl_secs = config.engine.match_list_ttl.as_secs(),
        "Engine configured"
    );
    let engine = SegmentEngine::with_database(Database::new(pool), config.engine);

    run_server(engine, config.port).await
}
