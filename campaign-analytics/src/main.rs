use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use campaign_analytics::aggregation::AggregationJob;
use campaign_analytics::config::AnalyticsConfig;
use campaign_analytics::scheduler::spawn_daily_aggregation;
use campaign_analytics::{app, AppState};
use common_ledger::PgDailyStatsStore;
use common_observability::AggregationMetrics;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AnalyticsConfig::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await
        .context("connect to DATABASE_URL")?;

    let metrics = Arc::new(AggregationMetrics::new()?);
    let job = Arc::new(AggregationJob::new(
        Arc::new(PgDailyStatsStore::new(db.clone())),
        config.aggregation_mode,
        config.max_past_days,
        config.history_size,
        metrics.clone(),
    ));
    if config.schedule_enabled {
        spawn_daily_aggregation(job.clone(), config.daily_at);
    }

    let state = AppState { db, job, metrics, sample_limit: config.sample_limit };
    let router = app(state)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        mode = ?config.aggregation_mode,
        daily_at = %config.daily_at,
        schedule_enabled = config.schedule_enabled,
        "starting campaign-analytics"
    );
    axum::serve(listener, router).await?;
    Ok(())
}
