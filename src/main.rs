use axum::{routing::get, Router};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{trace::TraceLayer, cors::{Any, CorsLayer}};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mooc_exam_engine::{
    config::Config,
    cooldown::CooldownPolicy,
    db, routes,
    scoring::PassingPolicy,
    store::{Datastore, PgStore},
    ExamEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "mooc_exam_engine=info,axum=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let pool = db::connect(&config.database).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Datastore::new(Arc::new(PgStore::new(pool)), config.database.timeout);
    let engine = ExamEngine::new(
        store,
        CooldownPolicy::new(config.exam.cooldown),
        PassingPolicy::new(config.exam.passing_threshold),
    );

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = config.server_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cooldown_secs = config.exam.cooldown.num_seconds(),
        passing_threshold = config.exam.passing_threshold,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
