use std::net::SocketAddr;
use std::sync::Arc;

use common_events::{KafkaEventSink, ParticipationProducer};
use common_observability::AdmissionMetrics;
use participation_service::config::ParticipationConfig;
use participation_service::{app, AppState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ParticipationConfig::from_env()?;
    let sink = KafkaEventSink::connect(&config.kafka_bootstrap, config.message_timeout_ms)?;
    let producer = Arc::new(ParticipationProducer::new(Arc::new(sink), config.topic.clone()));
    let metrics = Arc::new(AdmissionMetrics::new()?);
    let router = app(AppState { producer, metrics })?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, topic = %config.topic, "starting participation-service");
    axum::serve(listener, router).await?;
    Ok(())
}
