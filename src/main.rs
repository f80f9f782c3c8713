use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use learnhub_progress::{
    badges,
    catalog::PgCatalog,
    config::Config,
    db,
    routes,
    store::PgStore,
    ProgressEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "learnhub_progress=info,axum=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;

    let mut engine = ProgressEngine::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgCatalog::new(pool)),
    )
    .with_settings(config.engine);
    if let Some(path) = &config.badge_catalog_path {
        engine = engine.with_badges(badges::load_catalog(path)?)?;
        tracing::info!(path = %path.display(), "loaded badge catalog");
    }

    let app = routes::router(Arc::new(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
