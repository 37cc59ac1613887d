use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use hirehook_backend::{
    config::Config,
    db::{
        invocation_repository::InvocationRepository,
        postgres_invocation_repository::PostgresInvocationRepository,
    },
    engine::{HirePipeline, PipelineSettings},
    routes,
    services::{
        hr::HrClient,
        recruiting::RecruitingClient,
        request_logger::{RequestLogger, TracingRequestLogger},
    },
    AppState,
};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;

    let pg_pool = establish_connection(&config.database_url).await?;
    let invocation_repo = Arc::new(PostgresInvocationRepository { pool: pg_pool })
        as Arc<dyn InvocationRepository>;

    let logger = Arc::new(TracingRequestLogger) as Arc<dyn RequestLogger>;
    let recruiting = RecruitingClient::new(&config.recruiting, config.timeouts, logger.clone())
        .context("failed to build recruiting client")?;
    let hr = HrClient::new(&config.hr, config.timeouts, logger)
        .context("failed to build HR client")?;

    let pipeline = HirePipeline::new(
        recruiting,
        hr,
        invocation_repo.clone(),
        PipelineSettings {
            resume_context: config.resume_context.clone(),
            download_dir: config.download_dir.clone(),
            default_site: config.default_site.clone(),
        },
    );

    let state = AppState {
        invocation_repo,
        pipeline: Arc::new(pipeline),
    };

    let app = routes::router(state);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening for recruiting webhooks");
    axum::serve(listener, make_service).await?;
    Ok(())
}

/// `RUST_LOG` drives the filter; `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("Failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Failed to verify database connection")?;

    info!("✅ Successfully connected to the database");
    Ok(pool)
}
