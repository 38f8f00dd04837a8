use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use campaign_analytics::aggregation::{AggregationJob, AggregationMode};
use campaign_analytics::order_analysis::analyze;
use chrono::{NaiveDate, TimeZone, Utc};
use common_events::{BrokerMetadata, MemoryEventSink};
use common_ledger::memory::MemoryLedger;
use common_ledger::{NewParticipationRecord, SettlementStore, SettlementTx, StoreError};
use common_observability::{AggregationMetrics, SettlementMetrics};
use settlement_consumer::{
    AckError, Acknowledger, DeadLetterPublisher, GlobalSequence, InboundMessage, RetryPolicy,
    SettlementProcessor, TokioSleeper, WorkerPool,
};
use tokio::sync::watch;

struct NoopAck;

#[async_trait]
impl Acknowledger for NoopAck {
    async fn ack(&self, _partition: i32, _offset: i64) -> Result<(), AckError> {
        Ok(())
    }
}

/// Lets partition 0 append only after partition 1 has appended `lead` records, so the two
/// workers settle concurrently but never in arrival order.
struct LaggingStore {
    ledger: MemoryLedger,
    lead: usize,
    appended: watch::Sender<usize>,
}

struct LaggingTx {
    inner: Box<dyn SettlementTx>,
    lead: usize,
    appended: watch::Sender<usize>,
}

#[async_trait]
impl SettlementStore for LaggingStore {
    async fn begin(&self) -> Result<Box<dyn SettlementTx>, StoreError> {
        let inner = self.ledger.begin().await?;
        Ok(Box::new(LaggingTx { inner, lead: self.lead, appended: self.appended.clone() }))
    }
}

#[async_trait]
impl SettlementTx for LaggingTx {
    async fn campaign_exists(&mut self, campaign_id: i64) -> Result<bool, StoreError> {
        self.inner.campaign_exists(campaign_id).await
    }

    async fn decrement_stock(&mut self, campaign_id: i64) -> Result<bool, StoreError> {
        self.inner.decrement_stock(campaign_id).await
    }

    async fn append_record(&mut self, record: &NewParticipationRecord) -> Result<i64, StoreError> {
        match record.broker_partition {
            Some(0) => {
                let lead = self.lead;
                let mut progress = self.appended.subscribe();
                let _ = progress.wait_for(|n| *n >= lead).await;
                self.inner.append_record(record).await
            }
            Some(1) => {
                let id = self.inner.append_record(record).await?;
                self.appended.send_modify(|n| *n += 1);
                Ok(id)
            }
            _ => self.inner.append_record(record).await,
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

fn processor(ledger: &MemoryLedger) -> Arc<SettlementProcessor> {
    processor_over(Arc::new(ledger.clone()))
}

fn processor_over(store: Arc<dyn SettlementStore>) -> Arc<SettlementProcessor> {
    let metrics = Arc::new(SettlementMetrics::new().unwrap());
    let sink = Arc::new(MemoryEventSink::new());
    let retry = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        factor: 2.0,
        jitter: false,
    };
    Arc::new(SettlementProcessor::new(
        store,
        Arc::new(GlobalSequence::new()),
        DeadLetterPublisher::new(sink, "campaign-participation-topic.DLQ", metrics.clone()),
        retry,
        Arc::new(TokioSleeper),
        metrics,
    ))
}

/// Message `i` of a round-robin produce: partition `i % partitions`, timestamp `i`.
fn produced(i: i64, partitions: i64, campaign_id: i64) -> InboundMessage {
    let payload = serde_json::json!({ "campaignId": campaign_id, "userId": i }).to_string();
    let metadata = BrokerMetadata {
        partition: (i % partitions) as i32,
        offset: i / partitions,
        timestamp_ms: Some(1_700_000_000_000 + i),
    };
    InboundMessage::new(payload, metadata).with_key(campaign_id.to_string())
}

fn stats_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_thousand_participations_over_three_partitions() {
    let ledger = MemoryLedger::new();
    ledger.add_campaign(1, 10_000);
    ledger.set_clock(Utc.from_utc_datetime(&stats_day().and_hms_opt(9, 30, 0).unwrap()));
    let (appended, _) = watch::channel(0);
    let processor = processor_over(Arc::new(LaggingStore { ledger: ledger.clone(), lead: 2, appended }));

    let mut pool = WorkerPool::new(processor, Arc::new(NoopAck), 50, 512);
    for i in 0..10_000 {
        pool.dispatch(produced(i, 3, 1)).unwrap();
    }
    pool.shutdown().await;

    let records = ledger.records_for(1);
    assert_eq!(records.len(), 10_000);
    assert_eq!(records.iter().filter(|r| r.status == "SUCCESS").count(), 10_000);
    assert_eq!(ledger.campaign(1).unwrap().current_stock, 0);
    let sequences: HashSet<i64> = records.iter().filter_map(|r| r.global_sequence).collect();
    assert_eq!(sequences.len(), 10_000);

    let analysis = analyze(&records, 20);
    assert_eq!(analysis.analyzed_records, 10_000);
    assert_eq!(analysis.partition_count, 3);
    assert!(analysis.partition_mismatches.values().all(|&n| n == 0));
    // Offset 1 of partition 0 arrives before offset 1 of partition 1 but is sequenced after it.
    assert!(analysis.inversion_count > 0);
    assert!(analysis.order_accuracy_percent < 100.0);
    assert!(!analysis.violation_samples.is_empty() && analysis.violation_samples.len() <= 20);

    let metrics = Arc::new(AggregationMetrics::new().unwrap());
    let job = AggregationJob::new(Arc::new(ledger.clone()), AggregationMode::SetBased, 365, 10, metrics);
    job.run_for_date(stats_day()).await.unwrap();
    job.run_for_date(stats_day()).await.unwrap();
    let stats = ledger.stats();
    assert_eq!(stats.len(), 1);
    assert_eq!((stats[0].success_count, stats[0].fail_count), (10_000, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partitions_drained_one_after_another_lose_arrival_order() {
    let ledger = MemoryLedger::new();
    ledger.add_campaign(1, 3_000);
    let processor = processor(&ledger);

    // The consumer happens to drain partition 2 first, then 1, then 0.
    for partition in (0..3).rev() {
        let mut pool = WorkerPool::new(processor.clone(), Arc::new(NoopAck), 25, 2_000);
        for i in (0..3_000).filter(|i| i % 3 == partition) {
            pool.dispatch(produced(i, 3, 1)).unwrap();
        }
        pool.shutdown().await;
    }

    let analysis = analyze(&ledger.records_for(1), 20);
    assert_eq!(analysis.analyzed_records, 3_000);
    assert!(analysis.inversion_count > 0);
    assert!(analysis.order_accuracy_percent < 100.0);
    assert_eq!(analysis.violation_samples.len(), 20);
    assert!(analysis.partition_mismatches.values().all(|&n| n == 0));
}

#[tokio::test]
async fn single_partition_keeps_arrival_order() {
    let ledger = MemoryLedger::new();
    ledger.add_campaign(1, 500);
    let processor = processor(&ledger);

    let mut pool = WorkerPool::new(processor, Arc::new(NoopAck), 10, 1_000);
    for i in 0..1_000 {
        pool.dispatch(produced(i, 1, 1)).unwrap();
    }
    pool.shutdown().await;

    let records = ledger.records_for(1);
    assert_eq!(records.iter().filter(|r| r.status == "SUCCESS").count(), 500);
    assert_eq!(records.iter().filter(|r| r.status == "FAIL").count(), 500);
    let analysis = analyze(&records, 20);
    assert_eq!(analysis.inversion_count, 0);
    assert_eq!(analysis.order_accuracy_percent, 100.0);
}
