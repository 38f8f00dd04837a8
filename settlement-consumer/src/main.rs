use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use common_events::KafkaEventSink;
use common_ledger::{settlement_log, PgSettlementStore, MIGRATOR};
use common_observability::SettlementMetrics;
use rdkafka::consumer::{Consumer, StreamConsumer};
use settlement_consumer::kafka::{consumer_config, run, KafkaAcknowledger, KafkaFlowControl};
use settlement_consumer::{
    http, ConsumerConfig, DeadLetterPublisher, GlobalSequence, SettlementProcessor, TokioSleeper,
    WorkerPool,
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ConsumerConfig::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await
        .context("connect to DATABASE_URL")?;
    if config.run_migrations {
        MIGRATOR.run(&db).await.context("run ledger migrations")?;
    }

    let sequence = if config.resume_sequence_from_store {
        let last = settlement_log::max_global_sequence(&db).await?.unwrap_or(0);
        info!(last_sequence = last, "resuming global sequence from settlement log");
        GlobalSequence::starting_after(last)
    } else {
        GlobalSequence::new()
    };

    let metrics = Arc::new(SettlementMetrics::new()?);
    let dlq_sink = KafkaEventSink::connect(&config.kafka_bootstrap, config.dead_letter_timeout_ms)?;
    let dead_letters = DeadLetterPublisher::new(Arc::new(dlq_sink), config.dead_letter_topic.clone(), metrics.clone());
    let processor = Arc::new(SettlementProcessor::new(
        Arc::new(PgSettlementStore::new(db.clone())),
        Arc::new(sequence),
        dead_letters,
        config.retry_policy(),
        Arc::new(TokioSleeper),
        metrics.clone(),
    ));

    let consumer: StreamConsumer = consumer_config(&config).create().context("create kafka consumer")?;
    consumer.subscribe(&[config.topic.as_str()])?;
    let consumer = Arc::new(consumer);
    let acknowledger = Arc::new(KafkaAcknowledger::new(consumer.clone(), config.topic.clone()));
    let flow = Arc::new(KafkaFlowControl::new(consumer.clone(), config.topic.clone()));
    let pool = WorkerPool::new(processor, acknowledger, config.batch_size, config.channel_capacity)
        .with_flow_control(flow);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, topic = %config.topic, group = %config.group_id, batch_size = config.batch_size, "starting settlement-consumer");
    let app = http::router(metrics);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(?err, "settlement-consumer http server stopped");
        }
    });

    run(consumer, pool, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;
    info!("settlement-consumer stopped");
    Ok(())
}
